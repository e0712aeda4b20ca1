use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Labels assigned to support pages. `SupportArticle` is the catch-all when
/// no URL or body signal matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Faq,
    Guide,
    Troubleshooting,
    GettingStarted,
    Documentation,
    SupportArticle,
}

pub const ALL_CONTENT_TYPES: &[ContentType] = &[
    ContentType::Faq,
    ContentType::Guide,
    ContentType::Troubleshooting,
    ContentType::GettingStarted,
    ContentType::Documentation,
    ContentType::SupportArticle,
];

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Faq => "faq",
            ContentType::Guide => "guide",
            ContentType::Troubleshooting => "troubleshooting",
            ContentType::GettingStarted => "getting_started",
            ContentType::Documentation => "documentation",
            ContentType::SupportArticle => "support_article",
        }
    }

    /// Reverse of `as_str`, for rows read back from storage. Unknown labels
    /// collapse into the catch-all.
    pub fn parse(s: &str) -> ContentType {
        match s {
            "faq" => ContentType::Faq,
            "guide" => ContentType::Guide,
            "troubleshooting" => ContentType::Troubleshooting,
            "getting_started" => ContentType::GettingStarted,
            "documentation" => ContentType::Documentation,
            _ => ContentType::SupportArticle,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const URL_RULES: &[(&[&str], ContentType)] = &[
    (&["faq", "frequently-asked"], ContentType::Faq),
    (&["guide", "tutorial", "how-to"], ContentType::Guide),
    (&["troubleshoot", "problem", "fix"], ContentType::Troubleshooting),
    (&["getting-started", "setup", "install"], ContentType::GettingStarted),
    (&["api", "reference", "documentation"], ContentType::Documentation),
];

/// Assign a content-type label from URL-path and body heuristics. URL signals
/// outrank body text: a /faq/ page full of troubleshooting vocabulary is
/// still an FAQ.
pub fn classify(html: &str, url: &str) -> ContentType {
    let path = match Url::parse(url) {
        Ok(u) => u.path().to_lowercase(),
        Err(_) => url.to_lowercase(),
    };

    for (patterns, label) in URL_RULES {
        if patterns.iter().any(|p| path.contains(p)) {
            return *label;
        }
    }

    let body = html.to_lowercase();
    if body.contains("frequently asked questions") || body.matches("q:").count() > 3 {
        return ContentType::Faq;
    }
    if ["step 1", "first step", "getting started"]
        .iter()
        .any(|p| body.contains(p))
    {
        return ContentType::Guide;
    }
    if ["error", "troubleshoot", "problem", "issue"]
        .iter()
        .any(|p| body.contains(p))
    {
        return ContentType::Troubleshooting;
    }

    ContentType::SupportArticle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faq_from_url_path() {
        let got = classify("<html></html>", "https://www.aven.com/support/faq/billing");
        assert_eq!(got, ContentType::Faq);
    }

    #[test]
    fn url_signal_beats_body_signal() {
        // Body screams troubleshooting; the /faq/ path wins.
        let html = "<p>error troubleshoot problem issue</p>";
        let got = classify(html, "https://www.aven.com/support/faq/billing");
        assert_eq!(got, ContentType::Faq);
    }

    #[test]
    fn guide_and_setup_paths() {
        assert_eq!(
            classify("", "https://www.aven.com/support/guide/payments"),
            ContentType::Guide
        );
        assert_eq!(
            classify("", "https://www.aven.com/support/app-setup"),
            ContentType::GettingStarted
        );
        assert_eq!(
            classify("", "https://www.aven.com/support/api/reference"),
            ContentType::Documentation
        );
    }

    #[test]
    fn faq_from_question_markers() {
        let html = "<p>Q: one</p><p>Q: two</p><p>Q: three</p><p>Q: four</p>";
        assert_eq!(
            classify(html, "https://www.aven.com/support/cards"),
            ContentType::Faq
        );
        // Three markers are not enough.
        let html = "<p>Q: one</p><p>Q: two</p><p>Q: three</p>";
        assert_eq!(
            classify(html, "https://www.aven.com/support/cards"),
            ContentType::SupportArticle
        );
    }

    #[test]
    fn guide_from_step_phrasing() {
        let html = "<h1>Linking your bank</h1><p>Step 1: open the app.</p>";
        assert_eq!(
            classify(html, "https://www.aven.com/support/cards"),
            ContentType::Guide
        );
    }

    #[test]
    fn troubleshooting_from_body() {
        let html = "<p>If you see an error, restart the app.</p>";
        assert_eq!(
            classify(html, "https://www.aven.com/support/cards"),
            ContentType::Troubleshooting
        );
    }

    #[test]
    fn fallback_label() {
        assert_eq!(
            classify("<p>General information.</p>", "https://www.aven.com/support/cards"),
            ContentType::SupportArticle
        );
    }

    #[test]
    fn query_string_does_not_classify() {
        // Only the path is inspected for URL rules.
        assert_eq!(
            classify("<p>General information.</p>", "https://www.aven.com/support/cards?topic=faq"),
            ContentType::SupportArticle
        );
    }

    #[test]
    fn deterministic_for_same_input() {
        let html = "<p>Step 1: do the thing.</p>";
        let url = "https://www.aven.com/support/cards";
        assert_eq!(classify(html, url), classify(html, url));
    }

    #[test]
    fn label_round_trip() {
        for ct in ALL_CONTENT_TYPES {
            assert_eq!(ContentType::parse(ct.as_str()), *ct);
        }
        assert_eq!(ContentType::parse("bogus"), ContentType::SupportArticle);
    }
}
