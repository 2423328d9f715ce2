//! Crawl worker: fetches due data sources, extracts items, embeds and
//! stores them, and matches them to topics.
//!
//! Strategy per source type:
//!
//! | Source type          | Strategy                                             |
//! |----------------------|------------------------------------------------------|
//! | `rss`, `newsletter`  | Feed (declared or discovered), website as fallback   |
//! | `pdf`                | HTTP fetch of the document                           |
//! | everything else      | Search-first when a provider is configured, then HTTP|
//!
//! The HTTP strategy fetches the root page, follows up to
//! [`CRAWL_MAX_ARTICLES`] in-domain article links, and falls back to the root
//! page itself when it links to no articles.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use pulse_core::defaults::{
    CRAWL_BATCH_SIZE, CRAWL_FETCH_TIMEOUT_SECS, CRAWL_MAX_ARTICLES, CRAWL_SEARCH_RESULTS,
    CRAWL_USER_AGENT, EMBED_INPUT_MAX_CHARS, TOPIC_MATCH_THRESHOLD,
};
use pulse_core::{
    CrawlStatus, CrawledContent, CrawledContentRepository, DataSource, EmbeddingBackend, Error,
    Result, SearchOptions, SearchResult, SimilaritySearch, SourceType, WorkerState,
};
use pulse_db::Database;

use crate::extract::feed::parse_feed;
use crate::extract::html::{discover_feed_url, extract_article, extract_page, find_article_links};
use crate::extract::pdf::{extract_pdf, has_pdf_magic};
use crate::extract::url_utils::host_of;
use crate::extract::{truncate_chars, CrawledItem};
use crate::manager::Worker;
use crate::services::{DataSourceService, InsightService};
use crate::status::StatusService;

pub const CRAWL_WORKER_NAME: &str = "crawl";

/// Response body plus what is needed to classify it.
struct FetchedPage {
    url: String,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl FetchedPage {
    fn is_pdf(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/pdf"))
            || has_pdf_magic(&self.body)
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub struct CrawlWorker {
    sources: DataSourceService,
    insights: InsightService,
    content: Arc<dyn CrawledContentRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
    search: Option<Arc<dyn SimilaritySearch>>,
    status: Arc<StatusService>,
    http: reqwest::Client,
    batch_size: i64,
    topic_threshold: f64,
}

impl CrawlWorker {
    pub fn new(
        sources: DataSourceService,
        insights: InsightService,
        content: Arc<dyn CrawledContentRepository>,
        embedder: Arc<dyn EmbeddingBackend>,
        status: Arc<StatusService>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(CRAWL_FETCH_TIMEOUT_SECS))
            .user_agent(CRAWL_USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            sources,
            insights,
            content,
            embedder,
            search: None,
            status,
            http,
            batch_size: CRAWL_BATCH_SIZE,
            topic_threshold: TOPIC_MATCH_THRESHOLD,
        })
    }

    pub fn from_database(
        db: &Database,
        embedder: Arc<dyn EmbeddingBackend>,
        status: Arc<StatusService>,
    ) -> Result<Self> {
        Self::new(
            DataSourceService::from_database(db),
            InsightService::from_database(db, embedder.clone()),
            db.content.clone(),
            embedder,
            status,
        )
    }

    /// Enable the search-first strategy for website sources.
    pub fn with_search(mut self, search: Arc<dyn SimilaritySearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Crawl one source end to end. Returns the number of new items stored.
    async fn crawl_source(&self, source: &DataSource, cancel: &CancellationToken) -> Result<usize> {
        info!(
            subsystem = "jobs",
            component = "crawl",
            op = "crawl_source",
            source_id = %source.id,
            url = %source.url,
            source_type = %source.source_type,
            "Crawling source"
        );
        self.record_crawl_status(source, CrawlStatus::Crawling, None).await;

        let items = match source.source_type {
            SourceType::Rss | SourceType::Newsletter => self.crawl_feed(source).await?,
            SourceType::Pdf => self.crawl_http(&source.url).await?,
            _ => self.crawl_website(source).await?,
        };
        if items.is_empty() {
            info!(
                subsystem = "jobs",
                component = "crawl",
                source_id = %source.id,
                "No content found"
            );
            return Ok(0);
        }

        let mut inserted = 0;
        let mut cancelled = false;
        for item in items {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let url = item.url.clone();
            match self.store_item(source, item).await {
                Ok(true) => inserted += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    subsystem = "jobs",
                    component = "crawl",
                    op = "store_item",
                    source_id = %source.id,
                    url = %url,
                    error = %e,
                    "Failed to process content item"
                ),
            }
        }

        // Rows already written are counted even when the crawl stops early
        if inserted > 0 {
            if let Err(e) = self
                .sources
                .increment_content_count(source.id, inserted as i32)
                .await
            {
                warn!(
                    subsystem = "jobs",
                    component = "crawl",
                    source_id = %source.id,
                    error = %e,
                    "Failed to update content count"
                );
            }
        }
        if cancelled {
            return Err(Error::Cancelled(CRAWL_WORKER_NAME.to_string()));
        }
        info!(
            subsystem = "jobs",
            component = "crawl",
            op = "crawl_source",
            source_id = %source.id,
            result_count = inserted,
            "Source crawl completed"
        );
        Ok(inserted)
    }

    /// Feed strategy. A missing or unreadable feed falls back to the
    /// website strategy.
    async fn crawl_feed(&self, source: &DataSource) -> Result<Vec<CrawledItem>> {
        let feed_url = match source.feed_url.clone() {
            Some(url) => Some(url),
            None => self.discover_feed(&source.url).await,
        };
        let Some(feed_url) = feed_url else {
            debug!(
                subsystem = "jobs",
                component = "crawl",
                source_id = %source.id,
                "No feed found, crawling as website"
            );
            return self.crawl_website(source).await;
        };

        let parsed = match self.fetch(&feed_url).await {
            Ok(page) => parse_feed(&page.body),
            Err(e) => Err(e),
        };
        match parsed {
            Ok(items) => Ok(items),
            Err(e) => {
                warn!(
                    subsystem = "jobs",
                    component = "crawl",
                    source_id = %source.id,
                    url = %feed_url,
                    error = %e,
                    "Feed unavailable, crawling as website"
                );
                self.crawl_website(source).await
            }
        }
    }

    async fn discover_feed(&self, site_url: &str) -> Option<String> {
        let page = self.fetch(site_url).await.ok()?;
        let base = Url::parse(&page.url).ok()?;
        discover_feed_url(&page.text(), &base)
    }

    /// Website strategy: search-first when configured, HTTP otherwise or
    /// when search yields nothing.
    async fn crawl_website(&self, source: &DataSource) -> Result<Vec<CrawledItem>> {
        if let Some(search) = &self.search {
            match self.crawl_via_search(search.as_ref(), source).await {
                Ok(items) if !items.is_empty() => return Ok(items),
                Ok(_) => debug!(
                    subsystem = "jobs",
                    component = "crawl",
                    source_id = %source.id,
                    "No search results, falling back to HTTP crawl"
                ),
                Err(e) => warn!(
                    subsystem = "jobs",
                    component = "crawl",
                    source_id = %source.id,
                    error = %e,
                    "Search failed, falling back to HTTP crawl"
                ),
            }
        }
        self.crawl_http(&source.url).await
    }

    async fn crawl_via_search(
        &self,
        search: &dyn SimilaritySearch,
        source: &DataSource,
    ) -> Result<Vec<CrawledItem>> {
        let host = host_of(&source.url)
            .ok_or_else(|| Error::InvalidInput(format!("No host in url {}", source.url)))?;
        let results = search
            .search(
                &format!("site:{}", host),
                SearchOptions {
                    num_results: CRAWL_SEARCH_RESULTS,
                    include_domains: vec![host],
                    include_text: true,
                    include_summary: true,
                    start_published_date: None,
                },
            )
            .await?;
        Ok(results.into_iter().filter_map(search_result_to_item).collect())
    }

    /// HTTP strategy over the root url.
    async fn crawl_http(&self, url: &str) -> Result<Vec<CrawledItem>> {
        let page = self.fetch(url).await?;
        if page.is_pdf() {
            return Ok(vec![extract_pdf(&page.body, &page.url).await?]);
        }

        let html = page.text();
        let base = Url::parse(&page.url)
            .map_err(|e| Error::InvalidInput(format!("Invalid url {}: {}", page.url, e)))?;
        let links = find_article_links(&html, &base);
        if links.is_empty() {
            return Ok(extract_page(&html, &page.url).into_iter().collect());
        }

        debug!(
            subsystem = "jobs",
            component = "crawl",
            url = %url,
            result_count = links.len(),
            "Following article links"
        );
        let mut items = Vec::new();
        for link in links.into_iter().take(CRAWL_MAX_ARTICLES) {
            match self.fetch_article(&link).await {
                Ok(item) => items.push(item),
                Err(e) => warn!(
                    subsystem = "jobs",
                    component = "crawl",
                    op = "fetch_article",
                    url = %link,
                    error = %e,
                    "Skipping article"
                ),
            }
        }
        Ok(items)
    }

    async fn fetch_article(&self, url: &str) -> Result<CrawledItem> {
        let page = self.fetch(url).await?;
        if page.is_pdf() {
            return extract_pdf(&page.body, &page.url).await;
        }
        extract_article(&page.text(), &page.url)
    }

    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let target = if url.contains("://") {
            url.to_string()
        } else {
            format!("https://{}", url)
        };
        let response = self.http.get(&target).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Request(format!("HTTP {} fetching {}", status, target)));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_lowercase);
        let final_url = response.url().to_string();
        let body = response.bytes().await?.to_vec();
        Ok(FetchedPage {
            url: final_url,
            content_type,
            body,
        })
    }

    /// Bookkeeping writes never end the run; a failure is logged and the
    /// next source is still crawled.
    async fn record_crawl_status(
        &self,
        source: &DataSource,
        status: CrawlStatus,
        error_message: Option<&str>,
    ) {
        if let Err(e) = self
            .sources
            .update_crawl_status(source.id, status, error_message)
            .await
        {
            warn!(
                subsystem = "jobs",
                component = "crawl",
                source_id = %source.id,
                crawl_status = %status,
                error = %e,
                "Failed to record crawl status"
            );
        }
    }

    /// Store one item unless the source already has its url. Returns true
    /// when a new row was written.
    async fn store_item(&self, source: &DataSource, item: CrawledItem) -> Result<bool> {
        if self
            .content
            .find_by_url(source.id, &item.url)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let input = truncate_chars(&item.content, EMBED_INPUT_MAX_CHARS).to_string();
        let embedding = self
            .embedder
            .embed_texts(&[input])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("provider returned no embedding".to_string()))?;

        let content = CrawledContent {
            id: pulse_core::new_v7(),
            data_source_id: source.id,
            url: item.url,
            title: item.title,
            content: item.content,
            summary: None,
            author: item.author,
            published_at: item.published_at,
            embedding: Some(embedding.clone()),
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        };
        match self.content.save(&content).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => return Ok(false),
            Err(e) => return Err(e),
        }

        if let Err(e) = self
            .insights
            .match_content_to_topics(content.id, &embedding, self.topic_threshold)
            .await
        {
            warn!(
                subsystem = "jobs",
                component = "crawl",
                op = "match_topics",
                content_id = %content.id,
                error = %e,
                "Failed to match content to topics"
            );
        }
        Ok(true)
    }
}

/// Search hits without body text are dropped.
fn search_result_to_item(result: SearchResult) -> Option<CrawledItem> {
    let text = result.text.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
    let published_at = result
        .published_at()
        .or_else(|| parse_date_only(result.published_date.as_deref()?));
    let mut item = CrawledItem::new(result.url.clone(), text).with_title(result.title.clone());
    item.author = result.author.filter(|a| !a.trim().is_empty());
    item.published_at = published_at;
    Some(item)
}

fn parse_date_only(date: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
}

#[async_trait]
impl Worker for CrawlWorker {
    fn name(&self) -> &str {
        CRAWL_WORKER_NAME
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let name = CRAWL_WORKER_NAME;
        let start = Instant::now();
        if self.search.is_none() {
            debug!(
                subsystem = "jobs",
                component = "crawl",
                "Search provider not configured, using HTTP crawl only"
            );
        }

        self.status
            .update_status(name, WorkerState::Running, 0, "Fetching sources to crawl...")
            .await;
        let sources = self.sources.get_due_to_crawl(self.batch_size).await?;
        if sources.is_empty() {
            info!(subsystem = "jobs", component = "crawl", "No sources due for crawling");
            self.status
                .update_status(name, WorkerState::Running, 100, "No sources due for crawling")
                .await;
            return Ok(());
        }

        let total = sources.len() as u64;
        self.status
            .set_progress(name, 0, total, &format!("Found {} sources to crawl", total))
            .await;

        for (i, source) in sources.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(name.to_string()));
            }
            self.status
                .set_progress(name, i as u64, total, &format!("Crawling: {}", source.name))
                .await;

            match self.crawl_source(source, &cancel).await {
                Ok(_) => {
                    self.record_crawl_status(source, CrawlStatus::Success, None).await;
                    if let Err(e) = self
                        .sources
                        .set_next_crawl_time(source.id, source.crawl_frequency)
                        .await
                    {
                        warn!(
                            subsystem = "jobs",
                            component = "crawl",
                            source_id = %source.id,
                            error = %e,
                            "Failed to schedule next crawl"
                        );
                    }
                }
                Err(e @ Error::Cancelled(_)) => {
                    // Leave the source due again instead of stuck in `crawling`
                    self.record_crawl_status(source, CrawlStatus::Pending, None).await;
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        subsystem = "jobs",
                        component = "crawl",
                        op = "crawl_source",
                        source_id = %source.id,
                        url = %source.url,
                        error = %e,
                        "Failed to crawl source"
                    );
                    let message = e.to_string();
                    self.record_crawl_status(source, CrawlStatus::Failed, Some(&message))
                        .await;
                }
            }
        }

        info!(
            subsystem = "jobs",
            component = "crawl",
            result_count = total,
            duration_ms = start.elapsed().as_millis() as u64,
            "Crawl run completed"
        );
        self.status
            .set_progress(name, total, total, &format!("Completed crawling {} sources", total))
            .await;
        Ok(())
    }
}
