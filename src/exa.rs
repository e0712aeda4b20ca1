//! Thin client for the Exa search API.
//!
//! Two endpoints are used: `POST /search` for neural query sweeps and
//! `POST /contents` for fetching page text (optionally with one level of
//! subpages). Requests are spaced to the configured rate and retried with
//! exponential backoff on rate-limit and server errors.

use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::{self, HIGHLIGHTS_PER_URL, SENTENCES_PER_HIGHLIGHT};

const API_BASE: &str = "https://api.exa.ai";
const TIMEOUT_SECONDS: u64 = 30;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

pub struct ExaClient {
    http: reqwest::Client,
    api_key: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl ExaClient {
    pub fn new(api_key: String, requests_per_minute: u32) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .build()?;
        Ok(ExaClient {
            http,
            api_key,
            min_interval: Duration::from_secs_f64(60.0 / requests_per_minute.max(1) as f64),
            last_request: Mutex::new(None),
        })
    }

    /// Neural search restricted to the support domains, with page text and
    /// highlights included in the response.
    pub async fn search(&self, query: &str, num_results: usize) -> Result<Vec<ExaResult>> {
        let body = SearchRequest {
            query,
            search_type: "neural",
            use_autoprompt: true,
            num_results,
            include_domains: config::INCLUDE_DOMAINS,
            contents: ContentsSpec {
                text: true,
                highlights: HighlightsSpec::default(),
            },
        };
        let resp: ResultsEnvelope = self.post_with_retry("/search", &body).await?;
        Ok(resp.results)
    }

    /// Fetch text for the given URLs. When `subpages` is set, the crawler also
    /// follows up to that many same-site links matching the target keywords.
    pub async fn contents(&self, urls: &[String], subpages: Option<usize>) -> Result<Vec<ExaResult>> {
        let body = ContentsRequest {
            urls,
            text: true,
            highlights: HighlightsSpec::default(),
            subpages,
            subpage_target: subpages.map(|_| config::TARGET_CONTENT),
        };
        let resp: ResultsEnvelope = self.post_with_retry("/contents", &body).await?;
        Ok(resp.results)
    }

    async fn post_with_retry<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize,
        T: serde::de::DeserializeOwned,
    {
        let mut attempt: u32 = 0;
        loop {
            self.pace().await;
            let resp = self
                .http
                .post(format!("{API_BASE}{path}"))
                .header("x-api-key", &self.api_key)
                .json(body)
                .send()
                .await;
            match resp {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.json::<T>().await?);
                    }
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if !retryable || attempt == MAX_RETRIES {
                        bail!("exa {} returned {}", path, status);
                    }
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    warn!(
                        "Exa {} returned {} (attempt {}/{}), backing off {:.1}s",
                        path,
                        status,
                        attempt + 1,
                        MAX_RETRIES,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    if attempt == MAX_RETRIES {
                        return Err(e.into());
                    }
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    warn!(
                        "Exa {} failed: {} (attempt {}/{}), backing off {:.1}s",
                        path,
                        e,
                        attempt + 1,
                        MAX_RETRIES,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
            attempt += 1;
        }
    }

    /// Sleep out the remainder of the per-request interval. The lock is held
    /// across the sleep so concurrent callers are serialized.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let since = prev.elapsed();
            if since < self.min_interval {
                tokio::time::sleep(self.min_interval - since).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    search_type: &'a str,
    use_autoprompt: bool,
    num_results: usize,
    include_domains: &'a [&'a str],
    contents: ContentsSpec,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentsRequest<'a> {
    urls: &'a [String],
    text: bool,
    highlights: HighlightsSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    subpages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subpage_target: Option<&'a [&'a str]>,
}

#[derive(Serialize)]
struct ContentsSpec {
    text: bool,
    highlights: HighlightsSpec,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HighlightsSpec {
    num_sentences: usize,
    highlights_per_url: usize,
}

impl Default for HighlightsSpec {
    fn default() -> Self {
        HighlightsSpec {
            num_sentences: SENTENCES_PER_HIGHLIGHT,
            highlights_per_url: HIGHLIGHTS_PER_URL,
        }
    }
}

#[derive(Deserialize)]
struct ResultsEnvelope {
    #[serde(default)]
    results: Vec<ExaResult>,
}

/// One page as the API returns it, from either endpoint. Subpages appear only
/// on crawl responses and are never nested further.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExaResult {
    pub url: String,
    pub text: Option<String>,
    pub score: Option<f64>,
    pub published_date: Option<String>,
    pub author: Option<String>,
    pub highlights: Vec<String>,
    pub highlight_scores: Vec<f64>,
    pub subpages: Vec<ExaResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_request_uses_the_wire_names() {
        let body = SearchRequest {
            query: "Aven customer support help articles",
            search_type: "neural",
            use_autoprompt: true,
            num_results: 10,
            include_domains: config::INCLUDE_DOMAINS,
            contents: ContentsSpec {
                text: true,
                highlights: HighlightsSpec::default(),
            },
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["type"], "neural");
        assert_eq!(v["useAutoprompt"], true);
        assert_eq!(v["numResults"], 10);
        assert_eq!(v["includeDomains"][0], "aven.com");
        assert_eq!(v["contents"]["text"], true);
        assert_eq!(v["contents"]["highlights"]["numSentences"], 5);
        assert_eq!(v["contents"]["highlights"]["highlightsPerUrl"], 3);
    }

    #[test]
    fn contents_request_includes_subpage_fields_only_when_crawling() {
        let urls = vec!["https://www.aven.com/support".to_string()];

        let plain = ContentsRequest {
            urls: &urls,
            text: true,
            highlights: HighlightsSpec::default(),
            subpages: None,
            subpage_target: None,
        };
        let v = serde_json::to_value(&plain).unwrap();
        assert!(v.get("subpages").is_none());
        assert!(v.get("subpageTarget").is_none());

        let crawl = ContentsRequest {
            urls: &urls,
            text: true,
            highlights: HighlightsSpec::default(),
            subpages: Some(50),
            subpage_target: Some(config::TARGET_CONTENT),
        };
        let v = serde_json::to_value(&crawl).unwrap();
        assert_eq!(v["subpages"], 50);
        assert_eq!(v["subpageTarget"][0], "faq");
        assert_eq!(v["urls"][0], "https://www.aven.com/support");
    }

    #[test]
    fn response_parses_results_and_subpages() {
        let json = r#"{
            "results": [{
                "url": "https://www.aven.com/support",
                "title": "Aven Support",
                "text": "How can we help?",
                "score": 0.92,
                "publishedDate": "2024-01-15",
                "author": "Aven",
                "highlights": ["How can we help?"],
                "highlightScores": [0.88],
                "subpages": [{"url": "https://www.aven.com/support/faq"}]
            }]
        }"#;
        let envelope: ResultsEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.results.len(), 1);
        let r = &envelope.results[0];
        assert_eq!(r.url, "https://www.aven.com/support");
        assert_eq!(r.score, Some(0.92));
        assert_eq!(r.published_date.as_deref(), Some("2024-01-15"));
        assert_eq!(r.highlight_scores, vec![0.88]);
        assert_eq!(r.subpages.len(), 1);
        assert_eq!(r.subpages[0].url, "https://www.aven.com/support/faq");
        assert!(r.subpages[0].text.is_none());
    }

    #[test]
    fn empty_response_body_yields_no_results() {
        let envelope: ResultsEnvelope = serde_json::from_str("{}").unwrap();
        assert!(envelope.results.is_empty());
    }
}
