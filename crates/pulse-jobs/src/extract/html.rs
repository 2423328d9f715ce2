//! HTML article extraction.
//!
//! All functions are synchronous and take the raw page text: `scraper::Html`
//! is not `Send`, so documents are parsed and dropped without crossing an
//! `.await`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use pulse_core::defaults::{CONTENT_MAX_CHARS, CONTENT_MIN_FRAGMENT_CHARS};
use pulse_core::{Error, Result};

use super::{truncate_with_ellipsis, CrawledItem};

/// Containers tried in order when looking for the main content.
const MAIN_CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    ".content",
    ".post-content",
    ".entry-content",
    ".article-content",
    "#content",
    ".main-content",
];

const TEXT_BLOCKS: &str = "p, h1, h2, h3, h4, h5, h6, li";
const AUTHOR_SELECTOR: &str = "[rel='author'], .author, .byline";
const PUBLISHED_SELECTOR: &str = "time[datetime], [property='article:published_time']";
const FEED_LINK_SELECTOR: &str =
    "link[type='application/rss+xml'], link[type='application/atom+xml']";

/// Path fragments that mark a link as a likely article.
static ARTICLE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(blog|post|article|news)/|/20").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

const SKIPPED_SUFFIXES: &[&str] = &[".css", ".js", ".png", ".jpg"];

fn select_first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    doc.select(&selector).next()
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Page title from `<title>`, falling back to the first `<h1>`.
pub fn extract_title(doc: &Html) -> Option<String> {
    ["title", "h1"]
        .iter()
        .filter_map(|css| select_first(doc, css))
        .map(element_text)
        .find(|t| !t.is_empty())
}

/// Readable body text of the page.
///
/// Uses the first matching main-content container (or `<body>`) and joins
/// the text of its paragraphs, headings, and list items with blank lines,
/// skipping fragments of ten characters or fewer. The result is capped at
/// [`CONTENT_MAX_CHARS`] with an ellipsis.
pub fn extract_main_content(doc: &Html) -> String {
    let container = MAIN_CONTENT_SELECTORS
        .iter()
        .find_map(|css| select_first(doc, css))
        .or_else(|| select_first(doc, "body"));
    let Some(container) = container else {
        return String::new();
    };
    let Ok(blocks) = Selector::parse(TEXT_BLOCKS) else {
        return String::new();
    };

    let text = container
        .select(&blocks)
        .map(element_text)
        .filter(|t| t.chars().count() > CONTENT_MIN_FRAGMENT_CHARS)
        .collect::<Vec<_>>()
        .join("\n\n");

    truncate_with_ellipsis(text.trim(), CONTENT_MAX_CHARS)
}

pub fn extract_author(doc: &Html) -> Option<String> {
    let selector = Selector::parse(AUTHOR_SELECTOR).ok()?;
    doc.select(&selector)
        .map(element_text)
        .find(|a| !a.is_empty())
}

/// Publication time from `time[datetime]` or the `article:published_time`
/// meta property. Only RFC 3339 values are accepted.
pub fn extract_published_at(doc: &Html) -> Option<DateTime<Utc>> {
    let selector = Selector::parse(PUBLISHED_SELECTOR).ok()?;
    doc.select(&selector).find_map(|el| {
        let attrs = el.value();
        attrs
            .attr("datetime")
            .or_else(|| attrs.attr("content"))
            .and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
            .map(|d| d.with_timezone(&Utc))
    })
}

/// Extract one article page into an item. Fails when the page has no body text.
pub fn extract_article(html: &str, url: &str) -> Result<CrawledItem> {
    let doc = Html::parse_document(html);
    let content = extract_main_content(&doc);
    if content.is_empty() {
        return Err(Error::InvalidInput(format!("No content found at {}", url)));
    }

    let mut item = CrawledItem::new(url, content).with_title(extract_title(&doc));
    item.author = extract_author(&doc);
    item.published_at = extract_published_at(&doc);
    Ok(item)
}

/// Treat the whole page as a single item (used when no article links exist).
/// Returns `None` when the page has no body text.
pub fn extract_page(html: &str, url: &str) -> Option<CrawledItem> {
    let doc = Html::parse_document(html);
    let content = extract_main_content(&doc);
    if content.is_empty() {
        return None;
    }
    Some(CrawledItem::new(url, content).with_title(extract_title(&doc)))
}

/// In-domain links that look like articles, resolved against `base` and
/// de-duplicated in document order.
pub fn find_article_links(html: &str, base: &Url) -> Vec<String> {
    let doc = Html::parse_document(html);
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for href in doc.select(&anchors).filter_map(|a| a.value().attr("href")) {
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.contains("javascript:")
            || href.contains("mailto:")
            || SKIPPED_SUFFIXES.iter().any(|s| href.ends_with(s))
        {
            continue;
        }

        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if resolved.host_str() != base.host_str() {
            continue;
        }

        let resolved = resolved.to_string();
        if !seen.insert(resolved.clone()) {
            continue;
        }
        if is_likely_article(&resolved) {
            links.push(resolved);
        }
    }
    links
}

fn is_likely_article(url: &str) -> bool {
    Url::parse(url)
        .map(|u| ARTICLE_PATH.is_match(u.path()))
        .unwrap_or(false)
}

/// Feed advertised by the page through `<link rel="alternate">`, resolved
/// against `base`.
pub fn discover_feed_url(html: &str, base: &Url) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse(FEED_LINK_SELECTOR).ok()?;
    doc.select(&selector)
        .filter_map(|l| l.value().attr("href"))
        .find_map(|href| base.join(href.trim()).ok())
        .map(|u| u.to_string())
}

/// Plain text of an HTML fragment (feed entry bodies, summaries).
pub fn html_to_text(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    let paragraphs: Vec<String> = match Selector::parse(TEXT_BLOCKS) {
        Ok(blocks) => doc
            .select(&blocks)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    };
    if paragraphs.is_empty() {
        collapse_whitespace(&doc.root_element().text().collect::<String>())
    } else {
        paragraphs.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = r#"
        <html>
          <head>
            <title> Ownership in Practice </title>
            <meta property="article:published_time" content="2024-05-01T09:30:00Z">
          </head>
          <body>
            <nav><li>Home</li></nav>
            <article>
              <h1>Ownership in Practice</h1>
              <span class="byline">Ferris Crab</span>
              <p>Short.</p>
              <p>Borrowing lets you use a value without taking it.</p>
              <li>Moves transfer ownership between bindings.</li>
            </article>
          </body>
        </html>
    "#;

    #[test]
    fn test_extract_article_fields() {
        let item = extract_article(ARTICLE, "https://blog.example.com/post/1").unwrap();
        assert_eq!(item.title.as_deref(), Some("Ownership in Practice"));
        assert_eq!(item.author.as_deref(), Some("Ferris Crab"));
        assert_eq!(
            item.published_at.unwrap().to_rfc3339(),
            "2024-05-01T09:30:00+00:00"
        );
        assert_eq!(
            item.content,
            "Ownership in Practice\n\nBorrowing lets you use a value without taking it.\n\nMoves transfer ownership between bindings."
        );
    }

    #[test]
    fn test_extract_article_without_content_fails() {
        let err = extract_article("<html><body><p>tiny</p></body></html>", "https://x.dev").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_title_falls_back_to_h1() {
        let doc = Html::parse_document("<html><body><h1>Heading</h1></body></html>");
        assert_eq!(extract_title(&doc).as_deref(), Some("Heading"));
    }

    #[test]
    fn test_main_content_is_truncated() {
        let para = "word ".repeat(3000);
        let html = format!("<main><p>{}</p></main>", para);
        let doc = Html::parse_document(&html);
        let content = extract_main_content(&doc);
        assert!(content.ends_with("..."));
        assert_eq!(content.chars().count(), CONTENT_MAX_CHARS + 3);
    }

    #[test]
    fn test_published_at_from_time_element() {
        let doc = Html::parse_document(
            r#"<time datetime="not a date"></time><time datetime="2023-01-02T03:04:05+02:00"></time>"#,
        );
        assert_eq!(
            extract_published_at(&doc).unwrap().to_rfc3339(),
            "2023-01-02T01:04:05+00:00"
        );
    }

    #[test]
    fn test_find_article_links_filters_and_dedupes() {
        let html = r##"
            <a href="/blog/first">1</a>
            <a href="/blog/first">dup</a>
            <a href="https://blog.example.com/2024/05/second">2</a>
            <a href="/about">about</a>
            <a href="#top">top</a>
            <a href="mailto:me@example.com">mail</a>
            <a href="/news/style.css">css</a>
            <a href="https://elsewhere.org/blog/x">external</a>
        "##;
        let base = Url::parse("https://blog.example.com/").unwrap();
        let links = find_article_links(html, &base);
        assert_eq!(
            links,
            vec![
                "https://blog.example.com/blog/first".to_string(),
                "https://blog.example.com/2024/05/second".to_string(),
            ]
        );
    }

    #[test]
    fn test_discover_feed_url_resolves_relative() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/atom+xml" href="/feed.atom">
        </head></html>"#;
        let base = Url::parse("https://example.com/blog/").unwrap();
        assert_eq!(
            discover_feed_url(html, &base).as_deref(),
            Some("https://example.com/feed.atom")
        );
    }

    #[test]
    fn test_html_to_text() {
        assert_eq!(
            html_to_text("<p>First  para.</p><p>Second\npara.</p>"),
            "First para.\n\nSecond para."
        );
        assert_eq!(html_to_text("plain <b>bold</b> text"), "plain bold text");
    }

    #[test]
    fn test_extract_page_empty_is_none() {
        assert!(extract_page("<html><body></body></html>", "https://x.dev").is_none());
    }
}
