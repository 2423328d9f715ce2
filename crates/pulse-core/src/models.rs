//! Core data models for pulse.
//!
//! These types are shared across all pulse crates: worker status reporting,
//! data sources and their crawled content, insight topics, topic matches,
//! and generated insights.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

pub use pgvector::Vector;

// =============================================================================
// WORKER STATUS TYPES
// =============================================================================

/// Lifecycle state of a background worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// True for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Live status of one named worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub name: String,
    pub state: WorkerState,
    /// Percent complete, 0-100.
    pub progress: u8,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub items_done: u64,
    pub items_total: u64,
}

impl WorkerStatus {
    /// Fresh idle status for `name`.
    pub fn idle(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: WorkerState::Idle,
            progress: 0,
            message: String::new(),
            started_at: None,
            completed_at: None,
            error: None,
            items_done: 0,
            items_total: 0,
        }
    }
}

/// Snapshot broadcast to status subscribers after each mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub worker_name: String,
    pub status: WorkerStatus,
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// DATA SOURCE TYPES
// =============================================================================

/// Kind of content source; selects the crawl strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[default]
    Blog,
    Rss,
    Newsletter,
    Website,
    Pdf,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blog => "blog",
            Self::Rss => "rss",
            Self::Newsletter => "newsletter",
            Self::Website => "website",
            Self::Pdf => "pdf",
        }
    }

    /// Lenient parse used when reading stored rows: unknown kinds crawl as a website.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Self::Website)
    }

    /// Sources that publish a syndication feed.
    pub fn is_feed(&self) -> bool {
        matches!(self, Self::Rss | Self::Newsletter)
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blog" => Ok(Self::Blog),
            "rss" => Ok(Self::Rss),
            "newsletter" => Ok(Self::Newsletter),
            "website" => Ok(Self::Website),
            "pdf" => Ok(Self::Pdf),
            _ => Err(format!("Invalid source type: {}", s)),
        }
    }
}

/// How often a source is re-crawled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlFrequency {
    Hourly,
    #[default]
    Daily,
    Weekly,
}

impl CrawlFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    /// Unknown frequencies fall back to daily.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    pub fn interval(&self) -> Duration {
        match self {
            Self::Hourly => Duration::hours(1),
            Self::Daily => Duration::hours(24),
            Self::Weekly => Duration::days(7),
        }
    }

    /// Next crawl time counted from `now`.
    pub fn next_crawl_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.interval()
    }
}

impl std::fmt::Display for CrawlFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CrawlFrequency {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            _ => Err(format!("Invalid crawl frequency: {}", s)),
        }
    }
}

/// Outcome of the most recent crawl attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    #[default]
    Pending,
    Crawling,
    Success,
    Failed,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Crawling => "crawling",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CrawlStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "crawling" => Ok(Self::Crawling),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid crawl status: {}", s)),
        }
    }
}

/// A site, feed, or document crawled on a schedule.
///
/// At least one of `organization_id` / `user_id` is set. `url` is unique
/// across all sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub url: String,
    pub feed_url: Option<String>,
    pub source_type: SourceType,
    pub crawl_frequency: CrawlFrequency,
    pub is_enabled: bool,
    pub is_discovered: bool,
    pub discovered_from_id: Option<Uuid>,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub next_crawl_at: Option<DateTime<Utc>>,
    pub crawl_status: CrawlStatus,
    pub error_message: Option<String>,
    pub content_count: i32,
    pub subscriber_count: i32,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request for creating a data source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateDataSourceRequest {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub feed_url: Option<String>,
    #[serde(default)]
    pub source_type: Option<SourceType>,
    #[serde(default)]
    pub crawl_frequency: Option<CrawlFrequency>,
    #[serde(default)]
    pub is_enabled: Option<bool>,
}

/// Partial update of a data source. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDataSourceRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub feed_url: Option<String>,
    pub source_type: Option<SourceType>,
    pub crawl_frequency: Option<CrawlFrequency>,
    pub is_enabled: Option<bool>,
}

// =============================================================================
// CONTENT TYPES
// =============================================================================

/// One stored article, feed entry, or document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledContent {
    pub id: Uuid,
    pub data_source_id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub embedding: Option<Vector>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Crawled content with its similarity to a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSearchHit {
    pub content: CrawledContent,
    pub score: f64,
}

// =============================================================================
// TOPIC TYPES
// =============================================================================

/// A semantic topic that crawled content is matched against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightTopic {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    #[serde(skip)]
    pub embedding: Option<Vector>,
    pub is_auto_generated: bool,
    /// Number of content items matched to this topic (recomputed, never incremented).
    pub content_count: i32,
    pub last_insight_at: Option<DateTime<Utc>>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InsightTopic {
    /// Text embedded to represent the topic: name, description, then keywords.
    pub fn embedding_text(name: &str, description: Option<&str>, keywords: &[String]) -> String {
        let mut parts: Vec<&str> = vec![name];
        if let Some(desc) = description.filter(|d| !d.is_empty()) {
            parts.push(desc);
        }
        parts.extend(keywords.iter().map(String::as_str));
        parts.join(" ")
    }
}

/// Request for creating a topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTopicRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Partial update of a topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTopicRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// Association between a content item and a topic it matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentTopicMatch {
    pub id: Uuid,
    pub content_id: Uuid,
    pub topic_id: Uuid,
    pub similarity_score: f64,
    /// Set only on the highest-scoring topic for a content item.
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// INSIGHT TYPES
// =============================================================================

/// A generated summary of recent content under one topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: Uuid,
    pub organization_id: Option<Uuid>,
    pub topic_id: Option<Uuid>,
    pub title: String,
    pub summary: String,
    pub content: Option<String>,
    pub key_points: Vec<String>,
    pub source_content_ids: Vec<Uuid>,
    #[serde(skip)]
    pub embedding: Option<Vector>,
    pub generated_at: DateTime<Utc>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub is_pinned: bool,
    pub is_used_in_article: bool,
    pub metadata: JsonValue,
}

/// Insight together with the content it was generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightWithSources {
    #[serde(flatten)]
    pub insight: Insight,
    pub sources: Vec<CrawledContent>,
}

/// Fields for a newly generated insight.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewInsight {
    pub organization_id: Option<Uuid>,
    pub topic_id: Option<Uuid>,
    pub title: String,
    pub summary: String,
    pub content: Option<String>,
    pub key_points: Vec<String>,
    pub source_content_ids: Vec<Uuid>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

/// Paginated listing result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}
