//! Overlapping word-window chunking.
//!
//! Splits normalized page text into retrieval-sized chunks, each tagged with
//! the page metadata it came from and, where possible, the section heading it
//! falls under.

use serde::{Deserialize, Serialize};

use super::classify::ContentType;
use super::metadata::{Heading, PageMetadata};
use super::ProcessorConfig;

/// One retrieval-ready slice of a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    /// `{url}_chunk_{NNN}`, 1-based and zero-padded.
    pub chunk_id: String,
    pub source_url: String,
    pub title: String,
    pub content_type: ContentType,
    /// First page heading mentioned near the top of the chunk, when any.
    pub section_title: Option<String>,
    /// 1-based position within the page.
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub word_count: usize,
    pub char_count: usize,
    pub keywords: Vec<String>,
    pub content: String,
}

/// Splits cleaned text into overlapping chunks of at most `chunk_size`
/// characters. Content short enough to fit in one chunk is passed through
/// untouched; longer content is windowed word by word, with each window
/// trimmed back to the last sentence boundary so chunks read as prose.
///
/// Windows that shrink below `min_chunk_size` are dropped unless they close
/// out the document, so a page never loses its tail.
pub fn split_into_chunks(
    content: &str,
    meta: &PageMetadata,
    config: &ProcessorConfig,
) -> Vec<TextChunk> {
    if content.chars().count() <= config.chunk_size {
        return vec![TextChunk {
            chunk_id: format!("{}_chunk_{:03}", meta.url, 1),
            source_url: meta.url.clone(),
            title: meta.title.clone(),
            content_type: meta.content_type,
            section_title: None,
            chunk_index: 1,
            total_chunks: 1,
            word_count: content.split_whitespace().count(),
            char_count: content.chars().count(),
            keywords: meta.keywords.clone(),
            content: content.to_string(),
        }];
    }

    let words: Vec<&str> = content.split_whitespace().collect();
    // Rough estimate of five characters per word.
    let words_per_chunk = config.chunk_size / 5;
    let overlap_words = config.overlap_size / 5;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_num = 1usize;

    while start < words.len() {
        let end = (start + words_per_chunk).min(words.len());
        let mut chunk_words = words[start..end].to_vec();
        let mut candidate = chunk_words.join(" ");

        // A single word longer than chunk_size passes through oversized.
        while candidate.chars().count() > config.chunk_size && chunk_words.len() > 1 {
            chunk_words.pop();
            candidate = chunk_words.join(" ");
        }

        if candidate.chars().count() >= config.min_chunk_size || end == words.len() {
            if end < words.len() {
                let sentences: Vec<&str> = candidate.split('.').collect();
                if sentences.len() > 1 {
                    candidate = format!("{}.", sentences[..sentences.len() - 1].join("."));
                }
            }
            let trimmed = candidate.trim();
            chunks.push(TextChunk {
                chunk_id: format!("{}_chunk_{:03}", meta.url, chunk_num),
                source_url: meta.url.clone(),
                title: meta.title.clone(),
                content_type: meta.content_type,
                section_title: section_title(&candidate, &meta.headings),
                chunk_index: chunk_num,
                total_chunks: 0,
                word_count: trimmed.split_whitespace().count(),
                char_count: trimmed.chars().count(),
                keywords: meta.keywords.clone(),
                content: trimmed.to_string(),
            });
            chunk_num += 1;
        }

        start = (start + words_per_chunk)
            .saturating_sub(overlap_words)
            .max(start + 1);
        if end >= words.len() {
            break;
        }
    }

    let total = chunks.len();
    for chunk in &mut chunks {
        chunk.total_chunks = total;
    }
    chunks
}

/// Picks the first page heading whose text, or any word of it, shows up in
/// the opening 200 characters of the chunk. The match is deliberately loose;
/// headings rarely survive rendering verbatim.
fn section_title(content: &str, headings: &[Heading]) -> Option<String> {
    let prefix = content.chars().take(200).collect::<String>().to_lowercase();
    for heading in headings {
        let text = heading.text.to_lowercase();
        if prefix.contains(&text) || text.split_whitespace().any(|word| prefix.contains(word)) {
            return Some(heading.text.clone());
        }
    }
    None
}
