//! SQLite store for the scrape queue, fetched payloads, and processed pages.
//!
//! Four tables: `pages` is the discovery queue, `page_data` holds raw fetch
//! results (one row per fetch, errors included), `page_meta` holds extracted
//! page metadata, and `chunks` holds the chunked text ready for export.

use anyhow::Result;
use rusqlite::Connection;

use crate::processor::{ContentType, ProcessedPage, TextChunk};

const DB_PATH: &str = "data/aven.sqlite";

// ── Connection ──────────────────────────────────────────────────────────────

pub fn connect() -> Result<Connection> {
    if let Some(dir) = std::path::Path::new(DB_PATH).parent() {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            slug       TEXT NOT NULL,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_pages_visited ON pages(visited);

        CREATE TABLE IF NOT EXISTS page_data (
            id           INTEGER PRIMARY KEY,
            page_id      INTEGER NOT NULL REFERENCES pages(id),
            url          TEXT NOT NULL,
            slug         TEXT NOT NULL,
            text         TEXT,
            score        REAL,
            author       TEXT,
            published_at TEXT,
            highlights   TEXT,
            error        TEXT,
            latency_ms   INTEGER,
            fetched_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_page_data_page ON page_data(page_id);

        -- Pipeline output
        CREATE TABLE IF NOT EXISTS page_meta (
            id           INTEGER PRIMARY KEY,
            page_data_id INTEGER NOT NULL REFERENCES page_data(id),
            url          TEXT UNIQUE NOT NULL,
            slug         TEXT NOT NULL,
            title        TEXT NOT NULL,
            description  TEXT NOT NULL,
            content_type TEXT NOT NULL,
            language     TEXT NOT NULL,
            word_count   INTEGER NOT NULL,
            char_count   INTEGER NOT NULL,
            total_chunks INTEGER NOT NULL,
            keywords     TEXT NOT NULL,
            headings     TEXT NOT NULL,
            links        TEXT NOT NULL,
            processed_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS chunks (
            chunk_id      TEXT PRIMARY KEY,
            page_meta_id  INTEGER NOT NULL REFERENCES page_meta(id),
            source_url    TEXT NOT NULL,
            slug          TEXT NOT NULL,
            title         TEXT NOT NULL,
            content_type  TEXT NOT NULL,
            section_title TEXT,
            chunk_index   INTEGER NOT NULL,
            total_chunks  INTEGER NOT NULL,
            word_count    INTEGER NOT NULL,
            char_count    INTEGER NOT NULL,
            keywords      TEXT NOT NULL,
            content       TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chunks_type ON chunks(content_type);
        CREATE INDEX IF NOT EXISTS idx_chunks_url ON chunks(source_url);
        ",
    )?;
    Ok(())
}

// ── Queue ───────────────────────────────────────────────────────────────────

/// Queue discovered pages. Returns the number of newly inserted rows.
pub fn insert_pages(conn: &Connection, pages: &[(String, String)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare("INSERT OR IGNORE INTO pages (url, slug) VALUES (?1, ?2)")?;
        for (url, slug) in pages {
            count += stmt.execute(rusqlite::params![url, slug])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_unvisited(
    conn: &Connection,
    limit: Option<usize>,
) -> Result<Vec<(i64, String, String)>> {
    let sql = match limit {
        Some(n) => format!(
            "SELECT id, url, slug FROM pages WHERE visited = 0 ORDER BY id LIMIT {}",
            n
        ),
        None => "SELECT id, url, slug FROM pages WHERE visited = 0 ORDER BY id".to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Fetch results ───────────────────────────────────────────────────────────

/// One fetch outcome. Error rows still mark the page visited so a broken URL
/// is not retried on every run.
#[derive(Debug)]
pub struct FetchRow {
    pub page_id: i64,
    pub url: String,
    pub slug: String,
    pub text: Option<String>,
    pub score: Option<f64>,
    pub author: Option<String>,
    pub published_at: Option<String>,
    pub highlights: Option<String>,
    pub error: Option<String>,
    pub latency_ms: i64,
}

/// A fetched page awaiting processing.
pub struct FetchedPage {
    pub page_data_id: i64,
    pub url: String,
    pub slug: String,
    pub text: String,
}

/// Pages with fetched text and no `page_meta` row yet.
pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<FetchedPage>> {
    let base = "SELECT pd.id, pd.url, pd.slug, pd.text
         FROM page_data pd
         LEFT JOIN page_meta m ON m.page_data_id = pd.id
         WHERE pd.text IS NOT NULL AND pd.error IS NULL AND m.id IS NULL
         ORDER BY pd.id";
    let sql = match limit {
        Some(n) => format!("{} LIMIT {}", base, n),
        None => base.to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FetchedPage {
                page_data_id: row.get(0)?,
                url: row.get(1)?,
                slug: row.get(2)?,
                text: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Processed pages ─────────────────────────────────────────────────────────

pub struct ProcessedRecord {
    pub page_data_id: i64,
    pub slug: String,
    pub page: ProcessedPage,
}

/// Persist metadata and chunks for a batch of pages in one transaction.
/// Reprocessing a URL replaces its metadata row and chunks.
pub fn save_processed(conn: &Connection, records: &[ProcessedRecord]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut meta_stmt = tx.prepare(
            "INSERT OR REPLACE INTO page_meta
             (page_data_id, url, slug, title, description, content_type, language,
              word_count, char_count, total_chunks, keywords, headings, links)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        let mut purge_stmt = tx.prepare("DELETE FROM chunks WHERE source_url = ?1")?;
        let mut chunk_stmt = tx.prepare(
            "INSERT INTO chunks
             (chunk_id, page_meta_id, source_url, slug, title, content_type, section_title,
              chunk_index, total_chunks, word_count, char_count, keywords, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for rec in records {
            let meta = &rec.page.metadata;
            // Old chunks must go first: INSERT OR REPLACE deletes the
            // page_meta row they reference.
            purge_stmt.execute(rusqlite::params![meta.url])?;
            meta_stmt.execute(rusqlite::params![
                rec.page_data_id,
                meta.url,
                rec.slug,
                meta.title,
                meta.description,
                meta.content_type.as_str(),
                meta.language,
                meta.word_count,
                meta.char_count,
                rec.page.total_chunks,
                serde_json::to_string(&meta.keywords)?,
                serde_json::to_string(&meta.headings)?,
                serde_json::to_string(&meta.links)?,
            ])?;
            let page_meta_id = tx.last_insert_rowid();
            for chunk in &rec.page.chunks {
                chunk_stmt.execute(rusqlite::params![
                    chunk.chunk_id,
                    page_meta_id,
                    chunk.source_url,
                    rec.slug,
                    chunk.title,
                    chunk.content_type.as_str(),
                    chunk.section_title,
                    chunk.chunk_index,
                    chunk.total_chunks,
                    chunk.word_count,
                    chunk.char_count,
                    serde_json::to_string(&chunk.keywords)?,
                    chunk.content,
                ])?;
            }
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Export reads ────────────────────────────────────────────────────────────

/// Every stored chunk, ordered by source URL then position.
pub fn fetch_all_chunks(conn: &Connection) -> Result<Vec<TextChunk>> {
    let mut stmt = conn.prepare(
        "SELECT chunk_id, source_url, title, content_type, section_title,
                chunk_index, total_chunks, word_count, char_count, keywords, content
         FROM chunks ORDER BY source_url, chunk_index",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let content_type: String = row.get(3)?;
            let keywords: String = row.get(9)?;
            Ok(TextChunk {
                chunk_id: row.get(0)?,
                source_url: row.get(1)?,
                title: row.get(2)?,
                content_type: ContentType::parse(&content_type),
                section_title: row.get(4)?,
                chunk_index: row.get(5)?,
                total_chunks: row.get(6)?,
                word_count: row.get(7)?,
                char_count: row.get(8)?,
                keywords: serde_json::from_str(&keywords).unwrap_or_default(),
                content: row.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct PageSummary {
    pub url: String,
    pub title: String,
    pub content_type: String,
    pub word_count: usize,
    pub total_chunks: usize,
    pub processed_at: String,
}

pub fn fetch_page_summaries(conn: &Connection) -> Result<Vec<PageSummary>> {
    let mut stmt = conn.prepare(
        "SELECT url, title, content_type, word_count, total_chunks, processed_at
         FROM page_meta ORDER BY url",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PageSummary {
                url: row.get(0)?,
                title: row.get(1)?,
                content_type: row.get(2)?,
                word_count: row.get(3)?,
                total_chunks: row.get(4)?,
                processed_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn content_type_counts(conn: &Connection) -> Result<Vec<(String, usize)>> {
    let mut stmt = conn.prepare(
        "SELECT content_type, COUNT(*) FROM chunks GROUP BY content_type ORDER BY content_type",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// URLs fetched with usable text, sorted.
pub fn fetched_urls(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT url FROM page_data WHERE error IS NULL AND text IS NOT NULL ORDER BY url",
    )?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// URLs whose fetch failed, sorted.
pub fn failed_urls(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT url FROM page_data WHERE error IS NOT NULL ORDER BY url")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ───────────────────────────────────────────────────────────────────

pub struct Stats {
    pub total: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub fetched: usize,
    pub errors: usize,
    pub processed: usize,
    pub chunks: usize,
    pub words: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM pages", [], |r| r.get(0))?;
    let visited: usize =
        conn.query_row("SELECT COUNT(*) FROM pages WHERE visited = 1", [], |r| r.get(0))?;
    let fetched: usize = conn.query_row(
        "SELECT COUNT(*) FROM page_data WHERE error IS NULL AND text IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM page_data WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let processed: usize = conn.query_row("SELECT COUNT(*) FROM page_meta", [], |r| r.get(0))?;
    let chunks: usize = conn.query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get(0))?;
    let words: usize = conn.query_row(
        "SELECT COALESCE(SUM(word_count), 0) FROM chunks",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        total,
        visited,
        unvisited: total - visited,
        fetched,
        errors,
        processed,
        chunks,
        words,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{self, ProcessorConfig};
    use rusqlite::params;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        // Same enforcement as connect(), minus WAL (meaningless in memory).
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn mark_fetched(conn: &Connection, page_id: i64, url: &str, slug: &str, text: &str) {
        conn.execute(
            "INSERT INTO page_data (page_id, url, slug, text, latency_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![page_id, url, slug, text, 80_i64],
        )
        .unwrap();
        conn.execute(
            "UPDATE pages SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
            params![page_id],
        )
        .unwrap();
    }

    #[test]
    fn queue_ignores_duplicate_urls() {
        let conn = test_conn();
        let pages = vec![
            ("https://www.aven.com/support/faq".to_string(), "support-faq".to_string()),
            ("https://www.aven.com/support/guides".to_string(), "support-guides".to_string()),
        ];
        assert_eq!(insert_pages(&conn, &pages).unwrap(), 2);
        assert_eq!(insert_pages(&conn, &pages).unwrap(), 0);

        let unvisited = fetch_unvisited(&conn, None).unwrap();
        assert_eq!(unvisited.len(), 2);
        assert_eq!(unvisited[0].1, "https://www.aven.com/support/faq");
        assert_eq!(unvisited[0].2, "support-faq");
        assert_eq!(fetch_unvisited(&conn, Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn failed_fetches_never_reach_the_processing_queue() {
        let conn = test_conn();
        let url = "https://www.aven.com/support/faq";
        insert_pages(&conn, &[(url.to_string(), "support-faq".to_string())]).unwrap();
        let (page_id, ..) = fetch_unvisited(&conn, None).unwrap()[0].clone();

        conn.execute(
            "INSERT INTO page_data (page_id, url, slug, error, latency_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![page_id, url, "support-faq", "timeout after 3 attempts", 30000_i64],
        )
        .unwrap();
        conn.execute("UPDATE pages SET visited = 1 WHERE id = ?1", params![page_id])
            .unwrap();

        assert!(fetch_unprocessed(&conn, None).unwrap().is_empty());
        assert_eq!(failed_urls(&conn).unwrap(), vec![url.to_string()]);
        assert!(fetched_urls(&conn).unwrap().is_empty());

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.fetched, 0);
        assert_eq!(stats.unvisited, 0);
    }

    #[test]
    fn processed_pages_round_trip_through_the_store() {
        let conn = test_conn();
        let url = "https://www.aven.com/support/guides/getting-started";
        let slug = "support-guides-getting-started";
        insert_pages(&conn, &[(url.to_string(), slug.to_string())]).unwrap();
        let (page_id, ..) = fetch_unvisited(&conn, None).unwrap()[0].clone();

        let html = std::fs::read_to_string("tests/fixtures/getting_started_guide.html").unwrap();
        mark_fetched(&conn, page_id, url, slug, &html);

        let pending = fetch_unprocessed(&conn, None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, url);

        let page =
            processor::process(&pending[0].text, &pending[0].url, &ProcessorConfig::default())
                .unwrap();
        let records = vec![ProcessedRecord {
            page_data_id: pending[0].page_data_id,
            slug: slug.to_string(),
            page,
        }];
        save_processed(&conn, &records).unwrap();

        assert!(fetch_unprocessed(&conn, None).unwrap().is_empty());

        let chunks = fetch_all_chunks(&conn).unwrap();
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].source_url, url);
        assert_eq!(chunks[0].content_type, ContentType::Guide);
        assert_eq!(chunks[0].total_chunks, chunks.len());
        assert!(chunks[0].content.contains("Aven"));

        let summaries = fetch_page_summaries(&conn).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].title, "Getting Started with Aven | Aven Support");
        assert_eq!(summaries[0].content_type, "guide");
        assert_eq!(summaries[0].total_chunks, chunks.len());
        assert!(!summaries[0].processed_at.is_empty());

        assert_eq!(
            content_type_counts(&conn).unwrap(),
            vec![("guide".to_string(), chunks.len())]
        );

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.chunks, chunks.len());
        assert_eq!(stats.fetched, 1);
        assert!(stats.words > 0);
    }

    #[test]
    fn reprocessing_a_url_replaces_its_rows() {
        let conn = test_conn();
        let url = "https://www.aven.com/support/guides/getting-started";
        let slug = "support-guides-getting-started";
        insert_pages(&conn, &[(url.to_string(), slug.to_string())]).unwrap();
        let (page_id, ..) = fetch_unvisited(&conn, None).unwrap()[0].clone();

        let html = std::fs::read_to_string("tests/fixtures/getting_started_guide.html").unwrap();
        mark_fetched(&conn, page_id, url, slug, &html);

        let pending = fetch_unprocessed(&conn, None).unwrap();
        let page =
            processor::process(&pending[0].text, &pending[0].url, &ProcessorConfig::default())
                .unwrap();
        let records = vec![ProcessedRecord {
            page_data_id: pending[0].page_data_id,
            slug: slug.to_string(),
            page,
        }];

        save_processed(&conn, &records).unwrap();
        let first = fetch_all_chunks(&conn).unwrap().len();
        save_processed(&conn, &records).unwrap();

        assert_eq!(fetch_all_chunks(&conn).unwrap().len(), first);
        assert_eq!(get_stats(&conn).unwrap().processed, 1);

        // Every chunk row must reference the surviving page_meta row.
        let orphans: usize = conn
            .query_row(
                "SELECT COUNT(*) FROM chunks c
                 LEFT JOIN page_meta m ON m.id = c.page_meta_id
                 WHERE m.id IS NULL",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(orphans, 0);
    }
}
