//! HTML cleanup and plain-text rendering.
//!
//! Strips boilerplate chrome out of the document tree, renders the remainder
//! to text, and scrubs the rendering artifacts so chunking sees prose only.

use std::io::Cursor;
use std::sync::LazyLock;

use html2text::render::TrivialDecorator;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use super::ProcessError;

/// Class and id substrings that mark navigation chrome rather than article copy.
const CHROME_PATTERNS: &[&str] = &[
    "nav",
    "menu",
    "sidebar",
    "footer",
    "header",
    "advertisement",
    "social",
    "share",
    "cookie",
    "popup",
    "modal",
    "breadcrumb",
];

/// Wide enough that the renderer never rewraps real support copy.
const TEXT_WIDTH: usize = 10_000;

static STRIP_TAG_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script, style, nav, footer, aside, header").unwrap());
static ATTR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[class], [id]").unwrap());

static BLANK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static INDENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]+").unwrap());
static EMPTY_BOLD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*\s*\*\*").unwrap());
static EMPTY_EMPH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__\s*__").unwrap());
static EMPTY_LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\s*\]\(\s*\)").unwrap());
static EMPTY_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*[-*+]\s*\n").unwrap());
static RULE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[-=]{4,}\n").unwrap());

/// Strips chrome from a raw page and renders what is left to cleaned text.
///
/// Links are reduced to their anchor text and headings render as plain
/// text, which is what the section-title matching downstream reads.
pub fn normalize(html: &str) -> Result<String, ProcessError> {
    let stripped = strip_chrome(html)?;
    let text = html2text::from_read_with_decorator(
        Cursor::new(stripped.as_bytes()),
        TEXT_WIDTH,
        TrivialDecorator::new(),
    )
    .unwrap_or_else(|err| {
        warn!("text render failed, falling back to bare extraction: {:?}", err);
        raw_text(&stripped)
    });
    Ok(clean_text(&text))
}

/// Drops script/style/nav-style tags and anything whose class or id looks like
/// page chrome, then serializes the surviving tree back to HTML.
fn strip_chrome(html: &str) -> Result<String, ProcessError> {
    let mut doc = Html::parse_document(html);
    let root_id = doc
        .tree
        .root()
        .children()
        .find_map(ElementRef::wrap)
        .map(|el| el.id())
        .ok_or_else(|| ProcessError::Parse("document has no root element".to_string()))?;

    let mut doomed = Vec::new();
    for el in doc.select(&STRIP_TAG_SEL) {
        doomed.push(el.id());
    }
    for el in doc.select(&ATTR_SEL) {
        // The wrapper element itself must survive for serialization.
        if el.id() == root_id {
            continue;
        }
        let class = el.value().attr("class").unwrap_or("");
        let id = el.value().attr("id").unwrap_or("");
        let marker = format!("{} {}", class, id).to_lowercase();
        if CHROME_PATTERNS.iter().any(|pat| marker.contains(pat)) {
            doomed.push(el.id());
        }
    }
    for node_id in doomed {
        if let Some(mut node) = doc.tree.get_mut(node_id) {
            node.detach();
        }
    }

    Ok(doc
        .tree
        .get(root_id)
        .and_then(ElementRef::wrap)
        .map(|el| el.html())
        .unwrap_or_default())
}

/// Bare text extraction used when the renderer rejects the document.
fn raw_text(html: &str) -> String {
    Html::parse_document(html).root_element().text().collect()
}

/// Collapses whitespace runs and removes empty markup left behind by rendering.
fn clean_text(text: &str) -> String {
    let text = BLANK_RE.replace_all(text, "\n\n");
    let text = SPACE_RE.replace_all(&text, " ");
    let text = INDENT_RE.replace_all(&text, "\n");
    let text = EMPTY_BOLD_RE.replace_all(&text, "");
    let text = EMPTY_EMPH_RE.replace_all(&text, "");
    let text = EMPTY_LINK_RE.replace_all(&text, "");
    let text = EMPTY_ITEM_RE.replace_all(&text, "\n");
    let text = RULE_RE.replace_all(&text, "\n");
    text.trim().to_string()
}
