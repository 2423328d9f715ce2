//! RSS, Atom, and JSON Feed parsing.

use feed_rs::model::Entry;
use feed_rs::parser;

use pulse_core::defaults::{CONTENT_MAX_CHARS, CRAWL_MAX_ARTICLES};
use pulse_core::{Error, Result};

use super::html::html_to_text;
use super::{truncate_with_ellipsis, CrawledItem};

/// Parse a feed document into crawl items.
///
/// Entries without a link (or an `http` id to use instead) and entries whose
/// body and summary are both empty are skipped. At most
/// [`CRAWL_MAX_ARTICLES`] items are returned, each body capped like a
/// crawled article.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<CrawledItem>> {
    let feed = parser::parse(bytes)
        .map_err(|e| Error::InvalidInput(format!("Failed to parse feed: {}", e)))?;
    Ok(feed
        .entries
        .into_iter()
        .filter_map(entry_to_item)
        .take(CRAWL_MAX_ARTICLES)
        .collect())
}

fn entry_to_item(entry: Entry) -> Option<CrawledItem> {
    let url = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;

    let body = entry
        .content
        .as_ref()
        .and_then(|c| c.body.as_deref())
        .filter(|b| !b.trim().is_empty())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.as_str()))?;
    let content = html_to_text(body);
    if content.is_empty() {
        return None;
    }
    let content = truncate_with_ellipsis(&content, CONTENT_MAX_CHARS);

    let mut item = CrawledItem::new(url, content).with_title(entry.title.map(|t| t.content));
    item.author = entry
        .authors
        .first()
        .map(|a| a.name.trim().to_string())
        .filter(|a| !a.is_empty());
    item.published_at = entry.published.or(entry.updated);
    Some(item)
}
