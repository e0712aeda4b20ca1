pub mod chunk;
pub mod classify;
pub mod metadata;
pub mod normalize;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub use chunk::TextChunk;
pub use classify::ContentType;
pub use metadata::{Heading, PageLink, PageMetadata};

/// Chunking parameters plus the domain that keeps extracted links in scope.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub chunk_size: usize,
    pub overlap_size: usize,
    pub min_chunk_size: usize,
    pub root_domain: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            chunk_size: 1000,
            overlap_size: 100,
            min_chunk_size: 100,
            root_domain: "aven.com".to_string(),
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<(), ProcessError> {
        if self.min_chunk_size > self.chunk_size {
            return Err(ProcessError::Chunking(format!(
                "min_chunk_size ({}) must not exceed chunk_size ({})",
                self.min_chunk_size, self.chunk_size
            )));
        }
        if self.overlap_size >= self.chunk_size {
            return Err(ProcessError::Chunking(format!(
                "overlap_size ({}) must be smaller than chunk_size ({})",
                self.overlap_size, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("markup parse failed: {0}")]
    Parse(String),
    #[error("metadata extraction failed: {0}")]
    Extraction(String),
    #[error("chunking failed: {0}")]
    Chunking(String),
}

impl ProcessError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessError::Parse(_) => "parse_failure",
            ProcessError::Extraction(_) => "extraction_failure",
            ProcessError::Chunking(_) => "chunking_failure",
        }
    }
}

/// Structured failure surfaced to callers instead of a propagated error.
#[derive(Debug, Clone, Serialize)]
pub struct PageFailure {
    pub url: String,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessedPage {
    pub metadata: PageMetadata,
    pub content: String,
    pub chunks: Vec<TextChunk>,
    pub total_chunks: usize,
    pub total_words: usize,
    pub total_chars: usize,
}

/// Full pipeline for one page: metadata + classification → normalized text →
/// overlapping chunks. Never propagates an error; failed pages come back as a
/// `PageFailure` the caller can record and skip.
pub fn process(html: &str, url: &str, config: &ProcessorConfig) -> Result<ProcessedPage, PageFailure> {
    run_pipeline(html, url, config).map_err(|e| {
        warn!("processing failed for {}: {}", url, e);
        PageFailure {
            url: url.to_string(),
            kind: e.kind(),
            message: e.to_string(),
        }
    })
}

fn run_pipeline(
    html: &str,
    url: &str,
    config: &ProcessorConfig,
) -> Result<ProcessedPage, ProcessError> {
    config.validate()?;

    let mut metadata = metadata::extract(html, url, &config.root_domain)?;
    let content = normalize::normalize(html)?;
    metadata.word_count = content.split_whitespace().count();

    let chunks = chunk::split_into_chunks(&content, &metadata, config);

    Ok(ProcessedPage {
        total_chunks: chunks.len(),
        total_words: metadata.word_count,
        total_chars: content.chars().count(),
        metadata,
        content,
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProcessorConfig {
        ProcessorConfig::default()
    }

    #[test]
    fn processes_fixture_page_end_to_end() {
        let html = std::fs::read_to_string("tests/fixtures/payments_faq.html").unwrap();
        let page = process(&html, "https://www.aven.com/support/faq/payments", &config()).unwrap();

        assert_eq!(page.metadata.content_type, ContentType::Faq);
        assert_eq!(page.metadata.title, "Payments FAQ | Aven Support");
        assert!(!page.chunks.is_empty());
        assert_eq!(page.total_chunks, page.chunks.len());
        assert_eq!(page.total_words, page.content.split_whitespace().count());
        assert_eq!(page.total_chars, page.content.chars().count());
        assert!(page.content.contains("minimum payment"));
        // Chrome stripped during normalization.
        assert!(!page.content.contains("Cookie Preferences"));
    }

    #[test]
    fn chunks_carry_page_metadata() {
        let html = std::fs::read_to_string("tests/fixtures/payments_faq.html").unwrap();
        let url = "https://www.aven.com/support/faq/payments";
        let page = process(&html, url, &config()).unwrap();

        for chunk in &page.chunks {
            assert_eq!(chunk.source_url, url);
            assert_eq!(chunk.title, page.metadata.title);
            assert_eq!(chunk.content_type, page.metadata.content_type);
            assert_eq!(chunk.total_chunks, page.total_chunks);
        }
    }

    #[test]
    fn bad_source_url_is_an_extraction_failure() {
        let err = process("<html><body>hi</body></html>", "not a url", &config()).unwrap_err();
        assert_eq!(err.kind, "extraction_failure");
        assert_eq!(err.url, "not a url");
        assert!(!err.message.is_empty());
    }

    #[test]
    fn invalid_chunk_config_is_a_chunking_failure() {
        let bad = ProcessorConfig {
            chunk_size: 100,
            overlap_size: 100,
            min_chunk_size: 10,
            root_domain: "aven.com".to_string(),
        };
        let err = process("<p>hello</p>", "https://www.aven.com/support", &bad).unwrap_err();
        assert_eq!(err.kind, "chunking_failure");
    }

    #[test]
    fn min_chunk_size_above_chunk_size_rejected() {
        let bad = ProcessorConfig {
            chunk_size: 50,
            overlap_size: 10,
            min_chunk_size: 100,
            root_domain: "aven.com".to_string(),
        };
        assert!(bad.validate().is_err());
    }
}
