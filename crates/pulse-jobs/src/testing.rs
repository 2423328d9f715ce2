//! In-memory store fakes for worker and service tests.
//!
//! Each fake implements one `pulse-core` repository trait over a
//! `Mutex<Vec<_>>`, mirroring the ordering and conflict rules of the
//! Postgres repositories closely enough for behavior tests.
//!
//! ```rust,ignore
//! use pulse_jobs::testing::InMemoryStore;
//!
//! let store = InMemoryStore::new();
//! let sources = DataSourceService::new(store.data_sources.clone(), store.content.clone());
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pulse_core::{
    ContentSearchHit, ContentTopicMatch, ContentTopicMatchRepository, CrawlStatus, CrawledContent,
    CrawledContentRepository, DataSource, DataSourceRepository, Error, FindSimilarOptions,
    Insight, InsightRepository, InsightTopic, InsightTopicRepository, Result, SearchOptions,
    SearchResult, SimilaritySearch, Vector,
};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn page<T: Clone>(items: &[T], offset: i64, limit: i64) -> Vec<T> {
    items
        .iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

/// Cosine similarity; 0.0 for mismatched or zero vectors.
pub fn cosine(a: &Vector, b: &Vector) -> f64 {
    let (a, b) = (a.as_slice(), b.as_slice());
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// All five fakes, sharing nothing but created together.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    pub data_sources: Arc<InMemoryDataSources>,
    pub content: Arc<InMemoryContent>,
    pub topics: Arc<InMemoryTopics>,
    pub insights: Arc<InMemoryInsights>,
    pub topic_matches: Arc<InMemoryTopicMatches>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// =============================================================================
// DATA SOURCES
// =============================================================================

#[derive(Default)]
pub struct InMemoryDataSources {
    rows: Mutex<Vec<DataSource>>,
    fail_due: Mutex<bool>,
    failing_status_writes: Mutex<usize>,
    failing_schedule_writes: Mutex<usize>,
}

/// Consume one pending injected failure, if any.
fn take_failure(pending: &Mutex<usize>, what: &str) -> Result<()> {
    let mut left = guard(pending);
    if *left > 0 {
        *left -= 1;
        return Err(Error::Internal(format!("simulated {} failure", what)));
    }
    Ok(())
}

impl InMemoryDataSources {
    pub fn all(&self) -> Vec<DataSource> {
        guard(&self.rows).clone()
    }

    pub fn get(&self, id: Uuid) -> Option<DataSource> {
        guard(&self.rows).iter().find(|s| s.id == id).cloned()
    }

    /// Make `find_due_to_crawl` fail with a database-style error.
    pub fn fail_due_queries(&self) {
        *guard(&self.fail_due) = true;
    }

    /// Make the next `count` calls to `update_crawl_status` fail.
    pub fn fail_status_writes(&self, count: usize) {
        *guard(&self.failing_status_writes) = count;
    }

    /// Make the next `count` calls to `update_next_crawl_at` fail.
    pub fn fail_schedule_writes(&self, count: usize) {
        *guard(&self.failing_schedule_writes) = count;
    }

    fn with_row<F: FnOnce(&mut DataSource)>(&self, id: Uuid, f: F) {
        if let Some(row) = guard(&self.rows).iter_mut().find(|s| s.id == id) {
            f(row);
            row.updated_at = Utc::now();
        }
    }
}

#[async_trait]
impl DataSourceRepository for InMemoryDataSources {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<DataSource>> {
        Ok(self.get(id))
    }

    async fn find_by_organization(&self, organization_id: Uuid) -> Result<Vec<DataSource>> {
        let mut rows: Vec<_> = guard(&self.rows)
            .iter()
            .filter(|s| s.organization_id == Some(organization_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<DataSource>> {
        let mut rows: Vec<_> = guard(&self.rows)
            .iter()
            .filter(|s| s.user_id == Some(user_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<DataSource>> {
        Ok(guard(&self.rows).iter().find(|s| s.url == url).cloned())
    }

    async fn find_due_to_crawl(&self, limit: i64) -> Result<Vec<DataSource>> {
        if *guard(&self.fail_due) {
            return Err(Error::Internal("simulated due query failure".to_string()));
        }
        let now = Utc::now();
        let mut due: Vec<_> = guard(&self.rows)
            .iter()
            .filter(|s| s.is_enabled && s.crawl_status != CrawlStatus::Crawling)
            .filter(|s| s.next_crawl_at.map_or(true, |t| t <= now))
            .cloned()
            .collect();
        // None sorts before Some, matching NULLS FIRST
        due.sort_by(|a, b| a.next_crawl_at.cmp(&b.next_crawl_at));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<DataSource>, i64)> {
        let mut rows = self.all();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((page(&rows, offset, limit), rows.len() as i64))
    }

    async fn save(&self, source: &DataSource) -> Result<()> {
        let mut rows = guard(&self.rows);
        if rows.iter().any(|s| s.url == source.url) {
            return Err(Error::AlreadyExists(source.url.clone()));
        }
        rows.push(source.clone());
        Ok(())
    }

    async fn update(&self, source: &DataSource) -> Result<()> {
        let mut rows = guard(&self.rows);
        if rows.iter().any(|s| s.url == source.url && s.id != source.id) {
            return Err(Error::AlreadyExists(source.url.clone()));
        }
        let row = rows
            .iter_mut()
            .find(|s| s.id == source.id)
            .ok_or_else(|| Error::NotFound(format!("data source {}", source.id)))?;
        *row = source.clone();
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn update_crawl_status(
        &self,
        id: Uuid,
        status: CrawlStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        take_failure(&self.failing_status_writes, "crawl status write")?;
        self.with_row(id, |s| {
            s.crawl_status = status;
            if status == CrawlStatus::Success {
                s.last_crawled_at = Some(Utc::now());
                s.error_message = None;
            } else if let Some(msg) = error_message {
                s.error_message = Some(msg.to_string());
            }
        });
        Ok(())
    }

    async fn update_next_crawl_at(&self, id: Uuid, next: DateTime<Utc>) -> Result<()> {
        take_failure(&self.failing_schedule_writes, "next crawl write")?;
        self.with_row(id, |s| s.next_crawl_at = Some(next));
        Ok(())
    }

    async fn increment_content_count(&self, id: Uuid, delta: i32) -> Result<()> {
        self.with_row(id, |s| s.content_count += delta);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut rows = guard(&self.rows);
        let before = rows.len();
        rows.retain(|s| s.id != id);
        Ok(rows.len() < before)
    }
}

// =============================================================================
// CRAWLED CONTENT
// =============================================================================

#[derive(Default)]
pub struct InMemoryContent {
    rows: Mutex<Vec<CrawledContent>>,
    /// Source id → organization id, for the org-scoped queries.
    owners: Mutex<Vec<(Uuid, Uuid)>>,
}

impl InMemoryContent {
    pub fn all(&self) -> Vec<CrawledContent> {
        guard(&self.rows).clone()
    }

    /// Record that `data_source_id` belongs to `organization_id`.
    pub fn set_owner(&self, data_source_id: Uuid, organization_id: Uuid) {
        guard(&self.owners).push((data_source_id, organization_id));
    }

    fn in_org(&self, organization_id: Uuid) -> Vec<CrawledContent> {
        let owners = guard(&self.owners).clone();
        guard(&self.rows)
            .iter()
            .filter(|c| {
                owners
                    .iter()
                    .any(|(s, o)| *s == c.data_source_id && *o == organization_id)
            })
            .cloned()
            .collect()
    }

    fn rank(rows: Vec<CrawledContent>, embedding: &Vector, limit: i64) -> Vec<ContentSearchHit> {
        let mut hits: Vec<_> = rows
            .into_iter()
            .filter_map(|c| {
                let score = cosine(c.embedding.as_ref()?, embedding);
                Some(ContentSearchHit { content: c, score })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit.max(0) as usize);
        hits
    }
}

#[async_trait]
impl CrawledContentRepository for InMemoryContent {
    async fn find_by_url(
        &self,
        data_source_id: Uuid,
        url: &str,
    ) -> Result<Option<CrawledContent>> {
        Ok(guard(&self.rows)
            .iter()
            .find(|c| c.data_source_id == data_source_id && c.url == url)
            .cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<CrawledContent>> {
        Ok(guard(&self.rows)
            .iter()
            .filter(|c| ids.contains(&c.id))
            .cloned()
            .collect())
    }

    async fn save(&self, content: &CrawledContent) -> Result<()> {
        let mut rows = guard(&self.rows);
        if rows
            .iter()
            .any(|c| c.data_source_id == content.data_source_id && c.url == content.url)
        {
            return Err(Error::AlreadyExists(content.url.clone()));
        }
        rows.push(content.clone());
        Ok(())
    }

    async fn search_similar(
        &self,
        embedding: &Vector,
        limit: i64,
    ) -> Result<Vec<ContentSearchHit>> {
        Ok(Self::rank(self.all(), embedding, limit))
    }

    async fn search_similar_by_org(
        &self,
        organization_id: Uuid,
        embedding: &Vector,
        limit: i64,
    ) -> Result<Vec<ContentSearchHit>> {
        Ok(Self::rank(self.in_org(organization_id), embedding, limit))
    }

    async fn find_recent_by_org(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CrawledContent>> {
        let mut rows = self.in_org(organization_id);
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn find_by_data_source(
        &self,
        data_source_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<CrawledContent>, i64)> {
        let mut rows: Vec<_> = guard(&self.rows)
            .iter()
            .filter(|c| c.data_source_id == data_source_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((page(&rows, offset, limit), rows.len() as i64))
    }
}

// =============================================================================
// TOPICS
// =============================================================================

#[derive(Default)]
pub struct InMemoryTopics {
    rows: Mutex<Vec<InsightTopic>>,
    /// Fixed (topic, score) results returned by `search_similar` when set.
    scripted: Mutex<Option<Vec<(Uuid, f64)>>>,
}

impl InMemoryTopics {
    pub fn all(&self) -> Vec<InsightTopic> {
        guard(&self.rows).clone()
    }

    pub fn get(&self, id: Uuid) -> Option<InsightTopic> {
        guard(&self.rows).iter().find(|t| t.id == id).cloned()
    }

    /// Insert a topic directly.
    pub fn insert(&self, topic: InsightTopic) {
        guard(&self.rows).push(topic);
    }

    /// Return these scores from `search_similar` regardless of the query
    /// embedding. Threshold and limit still apply.
    pub fn script_similarity(&self, scores: Vec<(Uuid, f64)>) {
        *guard(&self.scripted) = Some(scores);
    }

    fn with_row<F: FnOnce(&mut InsightTopic)>(&self, id: Uuid, f: F) {
        if let Some(row) = guard(&self.rows).iter_mut().find(|t| t.id == id) {
            f(row);
        }
    }
}

#[async_trait]
impl InsightTopicRepository for InMemoryTopics {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<InsightTopic>> {
        Ok(self.get(id))
    }

    async fn find_by_organization(&self, organization_id: Uuid) -> Result<Vec<InsightTopic>> {
        Ok(guard(&self.rows)
            .iter()
            .filter(|t| t.organization_id == Some(organization_id))
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> Result<Vec<InsightTopic>> {
        Ok(self.all())
    }

    async fn search_similar(
        &self,
        embedding: &Vector,
        limit: i64,
        threshold: f64,
    ) -> Result<Vec<(InsightTopic, f64)>> {
        let rows = self.all();
        let scored: Vec<(InsightTopic, f64)> = match guard(&self.scripted).clone() {
            Some(script) => script
                .into_iter()
                .filter_map(|(id, score)| {
                    rows.iter().find(|t| t.id == id).map(|t| (t.clone(), score))
                })
                .collect(),
            None => rows
                .into_iter()
                .filter_map(|t| {
                    let score = cosine(t.embedding.as_ref()?, embedding);
                    Some((t, score))
                })
                .collect(),
        };

        let mut hits: Vec<_> = scored.into_iter().filter(|(_, s)| *s >= threshold).collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn save(&self, topic: &InsightTopic) -> Result<()> {
        self.insert(topic.clone());
        Ok(())
    }

    async fn update(&self, topic: &InsightTopic) -> Result<()> {
        let mut rows = guard(&self.rows);
        let row = rows
            .iter_mut()
            .find(|t| t.id == topic.id)
            .ok_or_else(|| Error::NotFound(format!("topic {}", topic.id)))?;
        *row = topic.clone();
        Ok(())
    }

    async fn update_content_count(&self, id: Uuid, count: i64) -> Result<()> {
        self.with_row(id, |t| t.content_count = count as i32);
        Ok(())
    }

    async fn update_last_insight_at(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.with_row(id, |t| t.last_insight_at = Some(at));
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut rows = guard(&self.rows);
        let before = rows.len();
        rows.retain(|t| t.id != id);
        Ok(rows.len() < before)
    }
}

// =============================================================================
// INSIGHTS
// =============================================================================

#[derive(Default)]
pub struct InMemoryInsights {
    rows: Mutex<Vec<Insight>>,
}

impl InMemoryInsights {
    pub fn all(&self) -> Vec<Insight> {
        guard(&self.rows).clone()
    }

    fn sorted_where<F: Fn(&Insight) -> bool>(&self, keep: F) -> Vec<Insight> {
        let mut rows: Vec<_> = guard(&self.rows).iter().filter(|i| keep(i)).cloned().collect();
        rows.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        rows
    }

    fn set_flag<F: FnOnce(&mut Insight)>(&self, id: Uuid, f: F) -> bool {
        match guard(&self.rows).iter_mut().find(|i| i.id == id) {
            Some(row) => {
                f(row);
                true
            }
            None => false,
        }
    }

    fn rank(rows: Vec<Insight>, embedding: &Vector, limit: i64) -> Vec<(Insight, f64)> {
        let mut hits: Vec<_> = rows
            .into_iter()
            .filter_map(|i| {
                let score = cosine(i.embedding.as_ref()?, embedding);
                Some((i, score))
            })
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1));
        hits.truncate(limit.max(0) as usize);
        hits
    }
}

#[async_trait]
impl InsightRepository for InMemoryInsights {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Insight>> {
        Ok(guard(&self.rows).iter().find(|i| i.id == id).cloned())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<Insight>, i64)> {
        let rows = self.sorted_where(|_| true);
        Ok((page(&rows, offset, limit), rows.len() as i64))
    }

    async fn find_by_organization(
        &self,
        organization_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Insight>, i64)> {
        let rows = self.sorted_where(|i| i.organization_id == Some(organization_id));
        Ok((page(&rows, offset, limit), rows.len() as i64))
    }

    async fn find_by_topic(
        &self,
        topic_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Insight>, i64)> {
        let rows = self.sorted_where(|i| i.topic_id == Some(topic_id));
        Ok((page(&rows, offset, limit), rows.len() as i64))
    }

    async fn find_unread(&self, organization_id: Uuid, limit: i64) -> Result<Vec<Insight>> {
        let rows =
            self.sorted_where(|i| i.organization_id == Some(organization_id) && !i.is_read);
        Ok(page(&rows, 0, limit))
    }

    async fn search_similar(&self, embedding: &Vector, limit: i64) -> Result<Vec<(Insight, f64)>> {
        Ok(Self::rank(self.all(), embedding, limit))
    }

    async fn search_similar_by_org(
        &self,
        organization_id: Uuid,
        embedding: &Vector,
        limit: i64,
    ) -> Result<Vec<(Insight, f64)>> {
        let rows = self.sorted_where(|i| i.organization_id == Some(organization_id));
        Ok(Self::rank(rows, embedding, limit))
    }

    async fn save(&self, insight: &Insight) -> Result<()> {
        guard(&self.rows).push(insight.clone());
        Ok(())
    }

    async fn mark_as_read(&self, id: Uuid) -> Result<bool> {
        Ok(self.set_flag(id, |i| i.is_read = true))
    }

    async fn toggle_pinned(&self, id: Uuid) -> Result<Option<bool>> {
        let mut pinned = None;
        self.set_flag(id, |i| {
            i.is_pinned = !i.is_pinned;
            pinned = Some(i.is_pinned);
        });
        Ok(pinned)
    }

    async fn mark_as_used_in_article(&self, id: Uuid) -> Result<bool> {
        Ok(self.set_flag(id, |i| i.is_used_in_article = true))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut rows = guard(&self.rows);
        let before = rows.len();
        rows.retain(|i| i.id != id);
        Ok(rows.len() < before)
    }

    async fn count_unread(&self, organization_id: Uuid) -> Result<i64> {
        Ok(guard(&self.rows)
            .iter()
            .filter(|i| i.organization_id == Some(organization_id) && !i.is_read)
            .count() as i64)
    }

    async fn count_all_unread(&self) -> Result<i64> {
        Ok(guard(&self.rows).iter().filter(|i| !i.is_read).count() as i64)
    }
}

// =============================================================================
// TOPIC MATCHES
// =============================================================================

#[derive(Default)]
pub struct InMemoryTopicMatches {
    rows: Mutex<Vec<ContentTopicMatch>>,
}

impl InMemoryTopicMatches {
    pub fn all(&self) -> Vec<ContentTopicMatch> {
        guard(&self.rows).clone()
    }

    /// Insert a match directly.
    pub fn insert(&self, m: ContentTopicMatch) {
        guard(&self.rows).push(m);
    }
}

#[async_trait]
impl ContentTopicMatchRepository for InMemoryTopicMatches {
    async fn save_batch(&self, matches: &[ContentTopicMatch]) -> Result<()> {
        let mut rows = guard(&self.rows);
        for m in matches {
            match rows
                .iter_mut()
                .find(|r| r.content_id == m.content_id && r.topic_id == m.topic_id)
            {
                Some(existing) => {
                    existing.similarity_score = m.similarity_score;
                    existing.is_primary = m.is_primary;
                }
                None => rows.push(m.clone()),
            }
        }
        Ok(())
    }

    async fn count_by_topic(&self, topic_id: Uuid) -> Result<i64> {
        Ok(guard(&self.rows)
            .iter()
            .filter(|m| m.topic_id == topic_id)
            .count() as i64)
    }

    async fn find_primary_by_topic(
        &self,
        topic_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<ContentTopicMatch>, i64)> {
        let mut rows: Vec<_> = guard(&self.rows)
            .iter()
            .filter(|m| m.topic_id == topic_id && m.is_primary)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok((page(&rows, offset, limit), rows.len() as i64))
    }
}

// =============================================================================
// SIMILARITY SEARCH
// =============================================================================

/// Scripted similarity-search provider.
#[derive(Default)]
pub struct FakeSearch {
    similar: Mutex<Vec<SearchResult>>,
    search: Mutex<Vec<SearchResult>>,
    fail: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results returned by every `find_similar` call.
    pub fn with_similar(self, results: Vec<SearchResult>) -> Self {
        *guard(&self.similar) = results;
        self
    }

    /// Results returned by every `search` call.
    pub fn with_search(self, results: Vec<SearchResult>) -> Self {
        *guard(&self.search) = results;
        self
    }

    /// Make every call fail with `Error::Search`.
    pub fn failing(self) -> Self {
        *guard(&self.fail) = true;
        self
    }

    /// Queries and urls received, in order.
    pub fn calls(&self) -> Vec<String> {
        guard(&self.calls).clone()
    }

    fn respond(
        &self,
        call: String,
        results: &Mutex<Vec<SearchResult>>,
        n: usize,
    ) -> Result<Vec<SearchResult>> {
        guard(&self.calls).push(call);
        if *guard(&self.fail) {
            return Err(Error::Search("simulated provider failure".to_string()));
        }
        Ok(guard(results).iter().take(n).cloned().collect())
    }
}

#[async_trait]
impl SimilaritySearch for FakeSearch {
    async fn find_similar(
        &self,
        url: &str,
        options: FindSimilarOptions,
    ) -> Result<Vec<SearchResult>> {
        self.respond(url.to_string(), &self.similar, options.num_results)
    }

    async fn search(&self, query: &str, options: SearchOptions) -> Result<Vec<SearchResult>> {
        self.respond(query.to_string(), &self.search, options.num_results)
    }
}
