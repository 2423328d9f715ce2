//! Core traits for pulse abstractions.
//!
//! Workers and services only see storage and providers through these
//! traits, so the Postgres and HTTP implementations can be swapped for
//! in-memory fakes in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

/// Repository for data sources.
#[async_trait]
pub trait DataSourceRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<DataSource>>;

    async fn find_by_organization(&self, organization_id: Uuid) -> Result<Vec<DataSource>>;

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<DataSource>>;

    async fn find_by_url(&self, url: &str) -> Result<Option<DataSource>>;

    /// Enabled sources whose `next_crawl_at` is null or in the past and that
    /// are not currently crawling, never-crawled first.
    async fn find_due_to_crawl(&self, limit: i64) -> Result<Vec<DataSource>>;

    /// Page through all sources, newest first. Returns the page and the total count.
    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<DataSource>, i64)>;

    /// Insert a new source. Fails with `AlreadyExists` on a duplicate url.
    async fn save(&self, source: &DataSource) -> Result<()>;

    /// Overwrite the mutable fields of an existing source.
    async fn update(&self, source: &DataSource) -> Result<()>;

    /// Record a crawl outcome. `Success` also stamps `last_crawled_at` and
    /// clears the previous error message.
    async fn update_crawl_status(
        &self,
        id: Uuid,
        status: CrawlStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    async fn update_next_crawl_at(&self, id: Uuid, next: DateTime<Utc>) -> Result<()>;

    async fn increment_content_count(&self, id: Uuid, delta: i32) -> Result<()>;

    /// Returns false when no row matched.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Repository for crawled content.
#[async_trait]
pub trait CrawledContentRepository: Send + Sync {
    /// Look up an item by its url within one source.
    async fn find_by_url(&self, data_source_id: Uuid, url: &str)
        -> Result<Option<CrawledContent>>;

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<CrawledContent>>;

    /// Insert a new item. Fails with `AlreadyExists` on a duplicate (source, url).
    async fn save(&self, content: &CrawledContent) -> Result<()>;

    async fn search_similar(&self, embedding: &Vector, limit: i64)
        -> Result<Vec<ContentSearchHit>>;

    /// Similarity search restricted to sources owned by an organization.
    async fn search_similar_by_org(
        &self,
        organization_id: Uuid,
        embedding: &Vector,
        limit: i64,
    ) -> Result<Vec<ContentSearchHit>>;

    async fn find_recent_by_org(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CrawledContent>>;

    async fn find_by_data_source(
        &self,
        data_source_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<CrawledContent>, i64)>;
}

/// Repository for insight topics.
#[async_trait]
pub trait InsightTopicRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<InsightTopic>>;

    async fn find_by_organization(&self, organization_id: Uuid) -> Result<Vec<InsightTopic>>;

    async fn find_all(&self) -> Result<Vec<InsightTopic>>;

    /// Topics with similarity at or above `threshold`, highest first.
    async fn search_similar(
        &self,
        embedding: &Vector,
        limit: i64,
        threshold: f64,
    ) -> Result<Vec<(InsightTopic, f64)>>;

    async fn save(&self, topic: &InsightTopic) -> Result<()>;

    async fn update(&self, topic: &InsightTopic) -> Result<()>;

    /// Overwrite the derived content count.
    async fn update_content_count(&self, id: Uuid, count: i64) -> Result<()>;

    async fn update_last_insight_at(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Repository for generated insights.
#[async_trait]
pub trait InsightRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Insight>>;

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<Insight>, i64)>;

    async fn find_by_organization(
        &self,
        organization_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Insight>, i64)>;

    async fn find_by_topic(
        &self,
        topic_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Insight>, i64)>;

    async fn find_unread(&self, organization_id: Uuid, limit: i64) -> Result<Vec<Insight>>;

    async fn search_similar(&self, embedding: &Vector, limit: i64) -> Result<Vec<(Insight, f64)>>;

    async fn search_similar_by_org(
        &self,
        organization_id: Uuid,
        embedding: &Vector,
        limit: i64,
    ) -> Result<Vec<(Insight, f64)>>;

    async fn save(&self, insight: &Insight) -> Result<()>;

    async fn mark_as_read(&self, id: Uuid) -> Result<bool>;

    /// Flip `is_pinned`, returning the new value (`None` if the insight does not exist).
    async fn toggle_pinned(&self, id: Uuid) -> Result<Option<bool>>;

    async fn mark_as_used_in_article(&self, id: Uuid) -> Result<bool>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn count_unread(&self, organization_id: Uuid) -> Result<i64>;

    async fn count_all_unread(&self) -> Result<i64>;
}

/// Repository for content-to-topic matches.
#[async_trait]
pub trait ContentTopicMatchRepository: Send + Sync {
    /// Insert matches; an existing (content, topic) pair is overwritten.
    async fn save_batch(&self, matches: &[ContentTopicMatch]) -> Result<()>;

    async fn count_by_topic(&self, topic_id: Uuid) -> Result<i64>;

    /// Primary matches for a topic, newest first, with the total primary count.
    async fn find_primary_by_topic(
        &self,
        topic_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<ContentTopicMatch>, i64)>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one vector per input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

// =============================================================================
// SIMILARITY SEARCH
// =============================================================================

/// Options for a "pages like this url" query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindSimilarOptions {
    pub num_results: usize,
    /// Omit results hosted on the query url's domain.
    pub exclude_source_domain: bool,
    pub include_text: bool,
}

/// Options for a keyword/neural search query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOptions {
    pub num_results: usize,
    pub include_domains: Vec<String>,
    pub include_text: bool,
    pub include_summary: bool,
    pub start_published_date: Option<DateTime<Utc>>,
}

/// One hit from a similarity-search provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: Option<String>,
    pub published_date: Option<String>,
    pub author: Option<String>,
    pub text: Option<String>,
    pub summary: Option<String>,
    pub score: Option<f64>,
}

impl SearchResult {
    /// `published_date` parsed as RFC 3339, when present and valid.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_date
            .as_deref()
            .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
            .map(|d| d.with_timezone(&Utc))
    }
}

/// External web similarity search.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn find_similar(&self, url: &str, options: FindSimilarOptions)
        -> Result<Vec<SearchResult>>;

    async fn search(&self, query: &str, options: SearchOptions) -> Result<Vec<SearchResult>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_result_published_at() {
        let r = SearchResult {
            url: "https://example.com/a".into(),
            published_date: Some("2024-03-01T12:00:00Z".into()),
            ..Default::default()
        };
        let at = r.published_at().unwrap();
        assert_eq!(at.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn test_search_result_bad_date_is_none() {
        let r = SearchResult {
            url: "https://example.com/a".into(),
            published_date: Some("last tuesday".into()),
            ..Default::default()
        };
        assert!(r.published_at().is_none());
    }
}
