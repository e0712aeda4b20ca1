mod config;
mod db;
mod discovery;
mod exa;
mod export;
mod processor;
mod scraper;

use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aven_scraper", about = "Aven support documentation scraper via the Exa API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover support URLs via Exa and populate the queue
    Discover,
    /// Fetch unvisited pages through the Exa contents endpoint
    Scrape {
        /// Max pages to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Clean, chunk, and store fetched pages
    Process {
        /// Max pages to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Discover + fetch + process in one pipeline
    Run {
        /// Max pages to fetch+process (default: MAX_PAGES)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Write all export files when the pipeline finishes
        #[arg(long)]
        export: bool,
    },
    /// Write chunk exports under the output directory
    Export,
    /// Show queue and processing statistics
    Stats,
    /// Print the active configuration and validate it
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Discover => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let cfg = config::Config::from_env();
            cfg.validate()?;
            let client = exa::ExaClient::new(cfg.exa_api_key.clone(), cfg.requests_per_minute)?;
            let pages = discovery::discover_support_urls(&client, &cfg).await?;
            let inserted = db::insert_pages(&conn, &pages)?;
            println!("Queued {} new support URLs ({} discovered)", inserted, pages.len());
            Ok(())
        }
        Commands::Scrape { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let cfg = config::Config::from_env();
            cfg.validate()?;
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'discover' first or all pages are fetched.");
                return Ok(());
            }
            println!("Fetching {} pages (streaming to DB)...", pages.len());
            let client =
                Arc::new(exa::ExaClient::new(cfg.exa_api_key.clone(), cfg.requests_per_minute)?);
            let stats = scraper::fetch_pages_streaming(&conn, client, pages).await?;
            println!(
                "Done: {} fetched ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Process { limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let cfg = config::Config::from_env();
            let pages = db::fetch_unprocessed(&conn, limit)?;
            if pages.is_empty() {
                println!("No unprocessed pages. Run 'scrape' first.");
                return Ok(());
            }
            println!("Processing {} pages...", pages.len());
            let counts = process_pages(&conn, &cfg.processor_config(), &pages)?;
            counts.print();
            Ok(())
        }
        Commands::Run { limit, export } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let cfg = config::Config::from_env();
            cfg.validate()?;
            let client =
                Arc::new(exa::ExaClient::new(cfg.exa_api_key.clone(), cfg.requests_per_minute)?);

            // Phase 1: Discover
            let t_discover = Instant::now();
            println!("Pipeline: discovering support URLs...");
            let discovered = discovery::discover_support_urls(&client, &cfg).await?;
            let inserted = db::insert_pages(&conn, &discovered)?;
            println!(
                "Discovered {} URLs ({} new) in {:.1}s",
                discovered.len(),
                inserted,
                t_discover.elapsed().as_secs_f64()
            );

            // Phase 2: Fetch (streaming to DB)
            let limit = limit.or(Some(cfg.max_pages));
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages to fetch.");
                return Ok(());
            }
            let t_fetch = Instant::now();
            println!("Pipeline: fetching {} pages (streaming to DB)...", pages.len());
            let stats = scraper::fetch_pages_streaming(&conn, Arc::clone(&client), pages).await?;
            println!(
                "Fetched {} pages ({} ok, {} errors) in {:.1}s",
                stats.total,
                stats.ok,
                stats.errors,
                t_fetch.elapsed().as_secs_f64()
            );

            // Phase 3: Process
            let t_process = Instant::now();
            let unprocessed = db::fetch_unprocessed(&conn, None)?;
            if unprocessed.is_empty() {
                println!("Nothing to process (all fetched pages had errors).");
                return Ok(());
            }
            println!("Processing {} pages...", unprocessed.len());
            let counts = process_pages(&conn, &cfg.processor_config(), &unprocessed)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();

            print_session_summary(&conn, t0.elapsed())?;

            if export {
                let files = export::export_all(&conn, &cfg.output_dir)?;
                println!("\nExported {} files to {}", files.len(), cfg.output_dir);
            }
            Ok(())
        }
        Commands::Export => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let cfg = config::Config::from_env();
            let stats = db::get_stats(&conn)?;
            if stats.chunks == 0 {
                println!("No chunks to export. Run 'process' first.");
                return Ok(());
            }
            let files = export::export_all(&conn, &cfg.output_dir)?;
            println!("Exported {} chunks to {}:", stats.chunks, cfg.output_dir);
            for f in &files {
                println!("  {}", f.display());
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Total:     {}", s.total);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("Fetched:   {}", s.fetched);
            println!("Errors:    {}", s.errors);
            println!("Processed: {}", s.processed);
            println!("Chunks:    {}", s.chunks);
            println!("Words:     {}", s.words);
            let counts = db::content_type_counts(&conn)?;
            if !counts.is_empty() {
                println!("\n--- Content Types ---");
                for (name, count) in &counts {
                    println!("  {:<16} {:>5}", name, count);
                }
            }
            Ok(())
        }
        Commands::Config => {
            let cfg = config::Config::from_env();
            println!("base_url:            {}", config::BASE_URL);
            println!("include_domains:     {}", config::INCLUDE_DOMAINS.join(", "));
            println!("max_pages:           {}", cfg.max_pages);
            println!("requests_per_minute: {}", cfg.requests_per_minute);
            println!("chunk_size:          {}", cfg.chunk_size);
            println!("overlap_size:        {}", cfg.overlap_size);
            println!("min_chunk_size:      {}", cfg.min_chunk_size);
            println!("output_dir:          {}", cfg.output_dir);
            println!(
                "exa_api_key:         {}",
                if cfg.exa_api_key.is_empty() { "(unset)" } else { "(set)" }
            );
            match cfg.validate() {
                Ok(()) => match std::fs::create_dir_all(&cfg.output_dir) {
                    Ok(()) => println!("\nConfiguration OK"),
                    Err(e) => println!("\nConfiguration error: output_dir {}: {}", cfg.output_dir, e),
                },
                Err(e) => println!("\nConfiguration error: {}", e),
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct ProcessCounts {
    pages: usize,
    chunks: usize,
    words: usize,
    failures: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} pages, {} chunks, {} words. {} pages failed.",
            self.pages, self.chunks, self.words, self.failures,
        );
    }
}

fn process_pages(
    conn: &rusqlite::Connection,
    proc_cfg: &processor::ProcessorConfig,
    pages: &[db::FetchedPage],
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    proc_cfg.validate()?;

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        pages: 0,
        chunks: 0,
        words: 0,
        failures: 0,
    };

    for batch in pages.chunks(500) {
        let results: Vec<_> = batch
            .par_iter()
            .map(|page| (page, processor::process(&page.text, &page.url, proc_cfg)))
            .collect();

        let mut records = Vec::new();
        for (page, outcome) in results {
            match outcome {
                Ok(processed) => {
                    counts.pages += 1;
                    counts.chunks += processed.total_chunks;
                    counts.words += processed.total_words;
                    records.push(db::ProcessedRecord {
                        page_data_id: page.page_data_id,
                        slug: page.slug.clone(),
                        page: processed,
                    });
                }
                // Failures are logged inside the pipeline; just count them.
                Err(_) => counts.failures += 1,
            }
        }

        db::save_processed(conn, &records)?;
        pb.inc(batch.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn print_session_summary(conn: &rusqlite::Connection, elapsed: std::time::Duration) -> anyhow::Result<()> {
    let s = db::get_stats(conn)?;
    println!("\n--- Session Summary ---");
    println!("Duration:  {}", format_duration(elapsed));
    println!("Queued:    {}", s.total);
    println!("Fetched:   {} ({} errors)", s.fetched, s.errors);
    println!("Processed: {}", s.processed);
    println!("Chunks:    {} ({} words)", s.chunks, s.words);
    let counts = db::content_type_counts(conn)?;
    if !counts.is_empty() {
        println!("\n--- Content Types ---");
        for (name, count) in &counts {
            println!("  {:<16} {:>5}", name, count);
        }
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
