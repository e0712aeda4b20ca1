//! File exports for downstream retrieval use.
//!
//! Everything is rebuilt from the store on each run: JSONL and CSV chunk
//! dumps, a per-page summary, a human-readable report, per-content-type
//! markdown collections, individual chunk files, a keyword index, and the
//! fetched URL list.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::db::{self, PageSummary};
use crate::processor::classify::ALL_CONTENT_TYPES;
use crate::processor::{ContentType, TextChunk};

/// Write every export format under `output_dir`. Returns the paths written.
pub fn export_all(conn: &Connection, output_dir: &str) -> Result<Vec<PathBuf>> {
    let chunks = db::fetch_all_chunks(conn)?;
    let summaries = db::fetch_page_summaries(conn)?;
    let fetched = db::fetched_urls(conn)?;
    let failed = db::failed_urls(conn)?;

    let dir = Path::new(output_dir);
    fs::create_dir_all(dir)?;
    let stamp = timestamp();

    let mut written = Vec::new();

    let path = dir.join("chunks.jsonl");
    fs::write(&path, jsonl_lines(&chunks)?)?;
    written.push(path);

    let path = dir.join("chunks.csv");
    fs::write(&path, chunks_csv(&chunks))?;
    written.push(path);

    let path = dir.join("summary.csv");
    fs::write(&path, summary_csv(&summaries))?;
    written.push(path);

    let path = dir.join("report.md");
    fs::write(&path, report_markdown(&summaries, &chunks, &fetched, &failed, &stamp))?;
    written.push(path);

    let type_dir = dir.join("by_content_type");
    fs::create_dir_all(&type_dir)?;
    for content_type in ALL_CONTENT_TYPES {
        let grouped: Vec<&TextChunk> = chunks
            .iter()
            .filter(|c| c.content_type == *content_type)
            .collect();
        if grouped.is_empty() {
            continue;
        }
        let path = type_dir.join(format!("{}_content.md", content_type.as_str()));
        fs::write(&path, content_type_markdown(*content_type, &grouped, &stamp))?;
        written.push(path);
    }

    let chunk_dir = dir.join("content_chunks");
    fs::create_dir_all(&chunk_dir)?;
    for (i, chunk) in chunks.iter().enumerate() {
        let path = chunk_dir.join(format!("chunk_{:04}.md", i + 1));
        fs::write(&path, chunk_markdown(chunk))?;
        written.push(path);
    }

    let path = dir.join("search_index.json");
    fs::write(&path, serde_json::to_string_pretty(&search_index(&chunks, &stamp))?)?;
    written.push(path);

    let path = dir.join("scraped_urls.txt");
    fs::write(&path, url_list(&fetched, &stamp))?;
    written.push(path);

    info!("Exported {} chunks to {}", chunks.len(), output_dir);
    Ok(written)
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── Chunk dumps ─────────────────────────────────────────────────────────────

fn jsonl_lines(chunks: &[TextChunk]) -> Result<String> {
    let mut out = String::new();
    for chunk in chunks {
        out.push_str(&serde_json::to_string(chunk)?);
        out.push('\n');
    }
    Ok(out)
}

/// Quote a CSV field when it carries a delimiter, quote, or newline.
fn csv_field(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn chunks_csv(chunks: &[TextChunk]) -> String {
    let mut out = String::from(
        "chunk_id,source_url,title,content_type,section_title,chunk_index,total_chunks,\
         word_count,char_count,keywords,content_preview,content_full\n",
    );
    for chunk in chunks {
        let row = [
            csv_field(&chunk.chunk_id),
            csv_field(&chunk.source_url),
            csv_field(&chunk.title),
            csv_field(chunk.content_type.as_str()),
            csv_field(chunk.section_title.as_deref().unwrap_or("")),
            chunk.chunk_index.to_string(),
            chunk.total_chunks.to_string(),
            chunk.word_count.to_string(),
            chunk.char_count.to_string(),
            csv_field(&chunk.keywords.join(", ")),
            csv_field(&preview(&chunk.content)),
            csv_field(&chunk.content),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// First 200 characters of the content, with an ellipsis when truncated.
fn preview(content: &str) -> String {
    if content.chars().count() <= 200 {
        content.to_string()
    } else {
        format!("{}...", content.chars().take(200).collect::<String>())
    }
}

fn summary_csv(pages: &[PageSummary]) -> String {
    let mut out = String::from("url,title,content_type,word_count,chunk_count,processed_at\n");
    for page in pages {
        let row = [
            csv_field(&page.url),
            csv_field(&page.title),
            csv_field(&page.content_type),
            page.word_count.to_string(),
            page.total_chunks.to_string(),
            csv_field(&page.processed_at),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

// ── Report ──────────────────────────────────────────────────────────────────

fn report_markdown(
    pages: &[PageSummary],
    chunks: &[TextChunk],
    fetched: &[String],
    failed: &[String],
    stamp: &str,
) -> String {
    let total_words: usize = chunks.iter().map(|c| c.word_count).sum();

    let mut out = String::from("# Aven Support Scraping Report\n\n");
    out.push_str(&format!("**Generated:** {}\n\n", stamp));

    out.push_str("## Totals\n\n");
    out.push_str(&format!("- **Pages Fetched:** {}\n", fetched.len()));
    out.push_str(&format!("- **Failed Fetches:** {}\n", failed.len()));
    out.push_str(&format!("- **Pages Processed:** {}\n", pages.len()));
    out.push_str(&format!("- **Total Chunks:** {}\n", chunks.len()));
    out.push_str(&format!("- **Total Words:** {}\n\n", total_words));

    out.push_str("## Content Type Analysis\n\n");
    out.push_str("| Content Type | Chunks | Words | Avg Words/Chunk |\n");
    out.push_str("|--------------|--------|-------|-----------------|\n");
    let mut by_type: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for chunk in chunks {
        let entry = by_type.entry(chunk.content_type.as_str()).or_default();
        entry.0 += 1;
        entry.1 += chunk.word_count;
    }
    for (name, (count, words)) in &by_type {
        out.push_str(&format!(
            "| {} | {} | {} | {:.0} |\n",
            title_case(name),
            count,
            words,
            *words as f64 / *count as f64
        ));
    }

    out.push_str("\n## Scraped URLs\n\n");
    for url in fetched {
        out.push_str(&format!("- [{}]({})\n", url, url));
    }

    if !failed.is_empty() {
        out.push_str("\n## Failed URLs\n\n");
        for url in failed {
            out.push_str(&format!("- {}\n", url));
        }
    }

    out
}

/// "support_article" -> "Support Article".
fn title_case(s: &str) -> String {
    s.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Markdown collections ────────────────────────────────────────────────────

fn content_type_markdown(content_type: ContentType, chunks: &[&TextChunk], stamp: &str) -> String {
    let mut out = format!("# Aven Support: {}\n\n", title_case(content_type.as_str()));
    out.push_str(&format!("*Exported on {}*\n\n", stamp));
    out.push_str(&format!("**Total sections:** {}\n\n---\n\n", chunks.len()));
    for (i, chunk) in chunks.iter().enumerate() {
        out.push_str(&format!("## {}. {}\n\n", i + 1, chunk.title));
        out.push_str(&format!(
            "**Source:** [{}]({})\n",
            chunk.source_url, chunk.source_url
        ));
        if let Some(section) = &chunk.section_title {
            out.push_str(&format!("**Section:** {}\n", section));
        }
        out.push_str(&format!(
            "**Chunk:** {}/{}\n\n",
            chunk.chunk_index, chunk.total_chunks
        ));
        out.push_str(&chunk.content);
        out.push_str("\n\n---\n\n");
    }
    out
}

fn chunk_markdown(chunk: &TextChunk) -> String {
    let mut out = format!("# {}\n\n", chunk.title);
    out.push_str(&format!("**Source:** {}\n", chunk.source_url));
    out.push_str(&format!("**Type:** {}\n", chunk.content_type));
    if let Some(section) = &chunk.section_title {
        out.push_str(&format!("**Section:** {}\n", section));
    }
    out.push_str(&format!(
        "**Chunk:** {}/{}\n\n---\n\n",
        chunk.chunk_index, chunk.total_chunks
    ));
    out.push_str(&chunk.content);
    out
}

// ── Search index ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SearchIndex {
    created_at: String,
    total_chunks: usize,
    index: BTreeMap<String, Vec<IndexEntry>>,
}

#[derive(Serialize)]
struct IndexEntry {
    chunk_id: String,
    url: String,
    title: String,
    content_type: String,
    relevance: f64,
}

fn search_index(chunks: &[TextChunk], stamp: &str) -> SearchIndex {
    let mut index: BTreeMap<String, Vec<IndexEntry>> = BTreeMap::new();
    for chunk in chunks {
        for term in index_terms(chunk) {
            index.entry(term).or_default().push(IndexEntry {
                chunk_id: chunk.chunk_id.clone(),
                url: chunk.source_url.clone(),
                title: chunk.title.clone(),
                content_type: chunk.content_type.as_str().to_string(),
                relevance: 1.0,
            });
        }
    }
    SearchIndex {
        created_at: stamp.to_string(),
        total_chunks: chunks.len(),
        index,
    }
}

const TERM_STRIP: &[char] = &['.', ',', '!', '?', ';', ':', '"', '(', ')', '[', ']', '{', '}'];

/// Indexable terms for one chunk: the first fifty significant content words,
/// every title word, and the page keywords.
fn index_terms(chunk: &TextChunk) -> BTreeSet<String> {
    let mut terms = BTreeSet::new();

    let content = chunk.content.to_lowercase();
    let significant = content
        .split_whitespace()
        .map(|w| w.trim_matches(TERM_STRIP))
        .filter(|w| w.chars().count() > 3 && w.chars().all(|c| c.is_alphabetic()))
        .take(50);
    terms.extend(significant.map(str::to_string));

    let title = chunk.title.to_lowercase();
    terms.extend(
        title
            .split_whitespace()
            .map(|w| w.trim_matches(TERM_STRIP))
            .filter(|w| !w.is_empty())
            .map(str::to_string),
    );

    terms.extend(
        chunk
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty()),
    );

    terms
}

// ── URL list ────────────────────────────────────────────────────────────────

fn url_list(urls: &[String], stamp: &str) -> String {
    let mut out = String::from("# Aven Support URLs Scraped\n");
    out.push_str(&format!("# Generated on {}\n", stamp));
    out.push_str(&format!("# Total URLs: {}\n\n", urls.len()));
    for url in urls {
        out.push_str(url);
        out.push('\n');
    }
    out
}
