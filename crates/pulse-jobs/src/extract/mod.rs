//! Content extraction helpers used by the crawl and discovery workers.
//!
//! - [`html`]: article text, metadata, and link extraction from HTML pages
//! - [`feed`]: RSS/Atom/JSON feed parsing
//! - [`pdf`]: text extraction from PDF bytes via `pdftotext`
//! - [`url_utils`]: URL normalization and domain comparison

pub mod feed;
pub mod html;
pub mod pdf;
pub mod url_utils;

use chrono::{DateTime, Utc};

/// One piece of content produced by a crawl strategy, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawledItem {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl CrawledItem {
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            content: content.into(),
            author: None,
            published_at: None,
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        self
    }
}

/// Prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Like [`truncate_chars`], appending `...` when anything was cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}
