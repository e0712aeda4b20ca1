use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::processor::classify::{self, ContentType};
use crate::processor::ProcessError;

static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static H1_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static DESCRIPTION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[name='description']").unwrap());
static KEYWORDS_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta[name='keywords']").unwrap());
static HEADING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heading {
    pub level: u8,
    pub text: String,
    /// `id` attribute of the heading element, empty when absent.
    pub anchor_id: String,
}

/// An in-domain link found on the page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLink {
    pub url: String,
    pub anchor_text: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMetadata {
    pub url: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub headings: Vec<Heading>,
    pub links: Vec<PageLink>,
    pub content_type: ContentType,
    /// Word count of the normalized text; zero until the pipeline fills it in.
    pub word_count: usize,
    /// Raw HTML length at extraction time.
    pub char_count: usize,
    pub language: String,
}

/// Pull title, description, keywords, headings and in-domain links out of the
/// raw HTML. Fails only when the source URL itself cannot be parsed, since
/// every relative link resolves against it.
pub fn extract(html: &str, url: &str, root_domain: &str) -> Result<PageMetadata, ProcessError> {
    let base = Url::parse(url)
        .map_err(|e| ProcessError::Extraction(format!("unparseable source url {}: {}", url, e)))?;
    let doc = Html::parse_document(html);

    let title = first_text(&doc, &TITLE_SEL)
        .or_else(|| first_text(&doc, &H1_SEL))
        .unwrap_or_default();
    let description = meta_content(&doc, &DESCRIPTION_SEL).unwrap_or_default();
    let keywords = meta_content(&doc, &KEYWORDS_SEL)
        .map(|raw| raw.split(',').map(|k| k.trim().to_string()).collect())
        .unwrap_or_default();

    Ok(PageMetadata {
        url: url.to_string(),
        title,
        description,
        keywords,
        headings: collect_headings(&doc),
        links: collect_links(&doc, &base, root_domain),
        content_type: classify::classify(html, url),
        word_count: 0,
        char_count: html.chars().count(),
        language: "en".to_string(),
    })
}

fn first_text(doc: &Html, sel: &Selector) -> Option<String> {
    let el = doc.select(sel).next()?;
    let text = el.text().collect::<String>().trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn meta_content(doc: &Html, sel: &Selector) -> Option<String> {
    let content = doc.select(sel).next()?.value().attr("content")?.trim();
    (!content.is_empty()).then(|| content.to_string())
}

fn collect_headings(doc: &Html) -> Vec<Heading> {
    let mut headings = Vec::new();
    for el in doc.select(&HEADING_SEL) {
        let level = match el.value().name().strip_prefix('h').and_then(|n| n.parse().ok()) {
            Some(l) => l,
            None => continue,
        };
        headings.push(Heading {
            level,
            text: el.text().collect::<String>().trim().to_string(),
            anchor_id: el.value().attr("id").unwrap_or("").to_string(),
        });
    }
    headings
}

fn collect_links(doc: &Html, base: &Url, root_domain: &str) -> Vec<PageLink> {
    let page_host = base.host_str().unwrap_or("");
    let mut links = Vec::new();

    for el in doc.select(&ANCHOR_SEL) {
        let href = match el.value().attr("href") {
            Some(h) => h,
            None => continue,
        };
        let resolved = match base.join(href) {
            Ok(u) => u,
            Err(_) => continue,
        };
        let host = resolved.host_str().unwrap_or("");
        if host.is_empty() || !(host.contains(page_host) || host.contains(root_domain)) {
            continue;
        }
        links.push(PageLink {
            url: resolved.to_string(),
            anchor_text: el.text().collect::<String>().trim().to_string(),
            title: el.value().attr("title").unwrap_or("").to_string(),
        });
    }

    links
}
