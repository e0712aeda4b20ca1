use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::FetchRow;
use crate::exa::ExaClient;

const CONCURRENCY: usize = 10;

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Fetch queued pages concurrently, saving each result to DB as it arrives.
/// Rate limiting and retries happen inside the client, so an error reaching
/// this loop is final.
pub async fn fetch_pages_streaming(
    conn: &Connection,
    client: Arc<ExaClient>,
    pages: Vec<(i64, String, String)>,
) -> Result<FetchStats> {
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let total = pages.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send results, main loop saves to DB
    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchRow>(CONCURRENCY * 2);

    // Spawn all fetch tasks
    for (page_id, url, slug) in pages {
        let client = Arc::clone(&client);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            let row = fetch_one(&client, page_id, &url, &slug).await;
            let _ = tx.send(row).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    // Receive and save each result immediately
    let mut ok = 0usize;
    let mut errors = 0usize;

    // Prepare statements once, reuse for each row
    let mut insert_stmt = conn.prepare(
        "INSERT INTO page_data
         (page_id, url, slug, text, score, author, published_at, highlights, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    let mut update_stmt = conn.prepare(
        "UPDATE pages SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
    )?;

    while let Some(row) = rx.recv().await {
        if row.error.is_some() {
            errors += 1;
        } else {
            ok += 1;
        }

        // Save immediately
        save_one(&mut insert_stmt, &mut update_stmt, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} pages ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}

/// Save a single fetch result to DB using pre-prepared statements.
fn save_one(
    insert: &mut rusqlite::Statement,
    update: &mut rusqlite::Statement,
    row: &FetchRow,
) -> Result<()> {
    insert.execute(rusqlite::params![
        row.page_id,
        row.url,
        row.slug,
        row.text,
        row.score,
        row.author,
        row.published_at,
        row.highlights,
        row.error,
        row.latency_ms,
    ])?;
    update.execute(rusqlite::params![row.page_id])?;
    Ok(())
}

/// Fetch one page. Failures come back as error rows so the page is still
/// marked visited.
async fn fetch_one(client: &ExaClient, page_id: i64, url: &str, slug: &str) -> FetchRow {
    let start = Instant::now();
    let urls = vec![url.to_string()];
    let response = client.contents(&urls, None).await;
    let elapsed = start.elapsed().as_millis() as i64;

    match response {
        Ok(results) => match results.into_iter().next() {
            Some(r) if r.text.as_deref().is_some_and(|t| !t.is_empty()) => FetchRow {
                page_id,
                url: url.to_string(),
                slug: slug.to_string(),
                text: r.text,
                score: r.score,
                author: r.author,
                published_at: r.published_date,
                highlights: highlights_json(&r.highlights, &r.highlight_scores),
                error: None,
                latency_ms: elapsed,
            },
            _ => error_row(page_id, url, slug, "no text returned".to_string(), elapsed),
        },
        Err(e) => {
            warn!("Fetch failed for {}: {}", slug, e);
            error_row(page_id, url, slug, e.to_string(), elapsed)
        }
    }
}

fn error_row(page_id: i64, url: &str, slug: &str, error: String, latency_ms: i64) -> FetchRow {
    FetchRow {
        page_id,
        url: url.to_string(),
        slug: slug.to_string(),
        text: None,
        score: None,
        author: None,
        published_at: None,
        highlights: None,
        error: Some(error),
        latency_ms,
    }
}

/// Highlights and their scores, paired up for the JSON column.
fn highlights_json(texts: &[String], scores: &[f64]) -> Option<String> {
    if texts.is_empty() {
        return None;
    }
    let entries: Vec<serde_json::Value> = texts
        .iter()
        .enumerate()
        .map(|(i, t)| serde_json::json!({ "text": t, "score": scores.get(i) }))
        .collect();
    serde_json::to_string(&entries).ok()
}
