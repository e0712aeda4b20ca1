//! Support-page discovery.
//!
//! Discovery runs in two phases: a crawl of the support root that follows
//! same-site subpage links, then a sweep of neural queries phrased the way
//! support hubs describe themselves. Every candidate URL passes through the
//! same validation gate before it is queued.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};
use url::Url;

use crate::config::{Config, ASSET_EXTENSIONS, BASE_URL, EXCLUDE_PATTERNS, INCLUDE_DOMAINS, TARGET_CONTENT};
use crate::exa::{ExaClient, ExaResult};

const CONTENT_QUERIES: &[&str] = &[
    "Aven credit card support documentation help center",
    "Aven frequently asked questions FAQ troubleshooting",
    "Aven user guide getting started tutorial",
    "Aven customer support help articles",
    "Aven app setup installation guide",
    "Aven account management billing support",
    "This is the comprehensive support documentation for Aven:",
    "Here are helpful Aven support articles for users:",
    "Aven customer service FAQ and troubleshooting guides:",
];

/// Run the full sweep and return deduplicated `(url, slug)` pairs in
/// discovery order. Failed queries are logged and skipped.
pub async fn discover_support_urls(
    client: &ExaClient,
    config: &Config,
) -> Result<Vec<(String, String)>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut discovered: Vec<(String, String)> = Vec::new();

    info!("Crawling {} for subpages", BASE_URL);
    match client
        .contents(&[BASE_URL.to_string()], Some(config.max_pages))
        .await
    {
        Ok(results) => collect_results(&results, &mut seen, &mut discovered),
        Err(e) => warn!("Base crawl failed: {}", e),
    }

    let num_results = (config.max_pages / 5).clamp(1, 10);
    for query in CONTENT_QUERIES {
        tokio::time::sleep(Duration::from_secs(1)).await;
        match client.search(query, num_results).await {
            Ok(results) => collect_results(&results, &mut seen, &mut discovered),
            Err(e) => warn!("Query \"{}\" failed: {}", query, e),
        }
    }

    info!("Discovered {} support URLs", discovered.len());
    Ok(discovered)
}

fn collect_results(
    results: &[ExaResult],
    seen: &mut HashSet<String>,
    discovered: &mut Vec<(String, String)>,
) {
    for result in results {
        collect_url(&result.url, seen, discovered);
        // Crawl responses nest subpages one level deep, never further.
        for subpage in &result.subpages {
            collect_url(&subpage.url, seen, discovered);
        }
    }
}

fn collect_url(url: &str, seen: &mut HashSet<String>, discovered: &mut Vec<(String, String)>) {
    if !is_valid_support_url(url) || !seen.insert(url.to_string()) {
        return;
    }
    discovered.push((url.to_string(), slug_from_url(url)));
}

/// A URL qualifies when it sits on an Aven domain, its path carries a
/// support keyword (or it is the support root itself), and it is neither an
/// excluded section nor a static asset.
pub fn is_valid_support_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let domain = parsed.host_str().unwrap_or("").to_lowercase();
    let path = parsed.path().to_lowercase();

    if !INCLUDE_DOMAINS.iter().any(|d| domain.contains(d)) {
        return false;
    }
    if !TARGET_CONTENT.iter().any(|p| path.contains(p)) && url != BASE_URL {
        return false;
    }
    if EXCLUDE_PATTERNS.iter().any(|p| path.contains(p)) {
        return false;
    }
    !ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Filesystem-safe identifier derived from the URL path.
pub fn slug_from_url(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().trim_matches('/').to_lowercase())
        .unwrap_or_default();
    if path.is_empty() {
        return "home".to_string();
    }
    path.replace('/', "-")
}
