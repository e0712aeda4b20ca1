//! Runtime configuration and compiled target constants.

use anyhow::{bail, Result};

use crate::processor::ProcessorConfig;

/// Entry point for discovery and the subpage crawl.
pub const BASE_URL: &str = "https://www.aven.com/support";
/// Domain every kept link and discovered page must belong to.
pub const ROOT_DOMAIN: &str = "aven.com";
pub const INCLUDE_DOMAINS: &[&str] = &["aven.com", "support.aven.com"];

/// Path fragments that disqualify a discovered URL.
pub const EXCLUDE_PATTERNS: &[&str] = &[
    "privacy-policy",
    "terms-of-service",
    "cookie-policy",
    "legal",
    "careers",
    "about-us",
    "contact",
    "blog",
];

/// Support-ish keywords, used both as the subpage crawl target and to accept
/// non-`/support` paths during discovery.
pub const TARGET_CONTENT: &[&str] = &[
    "faq",
    "guide",
    "tutorial",
    "help",
    "support",
    "documentation",
    "troubleshooting",
    "getting started",
    "how to",
    "setup",
    "installation",
];

/// File suffixes that mark a URL as an asset rather than a page.
pub const ASSET_EXTENSIONS: &[&str] = &[".pdf", ".jpg", ".jpeg", ".png", ".gif", ".css", ".js"];

pub const HIGHLIGHTS_PER_URL: usize = 3;
pub const SENTENCES_PER_HIGHLIGHT: usize = 5;

/// Environment-driven settings with compiled defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub exa_api_key: String,
    pub max_pages: usize,
    pub requests_per_minute: u32,
    pub chunk_size: usize,
    pub overlap_size: usize,
    pub min_chunk_size: usize,
    pub output_dir: String,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            exa_api_key: std::env::var("EXA_API_KEY").unwrap_or_default(),
            max_pages: env_parse("MAX_PAGES", 50),
            requests_per_minute: env_parse("REQUESTS_PER_MINUTE", 30),
            chunk_size: env_parse("CHUNK_SIZE", 1000),
            overlap_size: env_parse("OVERLAP_SIZE", 100),
            min_chunk_size: env_parse("MIN_CHUNK_SIZE", 100),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "./scraped_data".into()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.exa_api_key.is_empty() || self.exa_api_key == "your_exa_api_key_here" {
            bail!("EXA_API_KEY must be set in the environment");
        }
        if self.chunk_size < self.min_chunk_size {
            bail!(
                "chunk_size ({}) must be >= min_chunk_size ({})",
                self.chunk_size,
                self.min_chunk_size
            );
        }
        if self.overlap_size >= self.chunk_size {
            bail!(
                "overlap_size ({}) must be < chunk_size ({})",
                self.overlap_size,
                self.chunk_size
            );
        }
        Ok(())
    }

    /// The subset the page pipeline cares about.
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            chunk_size: self.chunk_size,
            overlap_size: self.overlap_size,
            min_chunk_size: self.min_chunk_size,
            root_domain: ROOT_DOMAIN.to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
