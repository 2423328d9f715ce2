//! Insight, topic, and semantic content search operations.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pulse_core::defaults::TOPIC_MATCH_LIMIT;
use pulse_core::{
    ContentSearchHit, ContentTopicMatch, ContentTopicMatchRepository, CrawledContent,
    CrawledContentRepository, CreateTopicRequest, EmbeddingBackend, Error, Insight,
    InsightRepository, InsightTopic, InsightTopicRepository, InsightWithSources, NewInsight, Page,
    Result, UpdateTopicRequest, Vector,
};
use pulse_db::Database;

use super::{clamp_page, clamp_search_limit};

/// Generated insights, the topics they are grouped under, and the
/// embedding-backed lookups over both.
#[derive(Clone)]
pub struct InsightService {
    insights: Arc<dyn InsightRepository>,
    topics: Arc<dyn InsightTopicRepository>,
    content: Arc<dyn CrawledContentRepository>,
    matches: Arc<dyn ContentTopicMatchRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl InsightService {
    pub fn new(
        insights: Arc<dyn InsightRepository>,
        topics: Arc<dyn InsightTopicRepository>,
        content: Arc<dyn CrawledContentRepository>,
        matches: Arc<dyn ContentTopicMatchRepository>,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            insights,
            topics,
            content,
            matches,
            embedder,
        }
    }

    pub fn from_database(db: &Database, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self::new(
            db.insights.clone(),
            db.topics.clone(),
            db.content.clone(),
            db.topic_matches.clone(),
            embedder,
        )
    }

    async fn embed(&self, text: String) -> Result<Vector> {
        self.embedder
            .embed_texts(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("provider returned no embedding".to_string()))
    }

    // =========================================================================
    // INSIGHTS
    // =========================================================================

    pub async fn get_insight(&self, id: Uuid) -> Result<Insight> {
        self.insights
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("insight {}", id)))
    }

    /// The insight plus the content items it was generated from.
    pub async fn get_insight_with_sources(&self, id: Uuid) -> Result<InsightWithSources> {
        let insight = self.get_insight(id).await?;
        let sources = if insight.source_content_ids.is_empty() {
            Vec::new()
        } else {
            self.content.find_by_ids(&insight.source_content_ids).await?
        };
        Ok(InsightWithSources { insight, sources })
    }

    pub async fn list_insights(
        &self,
        organization_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<Page<Insight>> {
        let (page, limit) = clamp_page(page, limit);
        let (items, total) = self
            .insights
            .find_by_organization(organization_id, (page - 1) * limit, limit)
            .await?;
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn list_all_insights(&self, page: i64, limit: i64) -> Result<Page<Insight>> {
        let (page, limit) = clamp_page(page, limit);
        let (items, total) = self.insights.list((page - 1) * limit, limit).await?;
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn list_insights_by_topic(
        &self,
        topic_id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<Page<Insight>> {
        let (page, limit) = clamp_page(page, limit);
        let (items, total) = self
            .insights
            .find_by_topic(topic_id, (page - 1) * limit, limit)
            .await?;
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn list_unread(&self, organization_id: Uuid, limit: i64) -> Result<Vec<Insight>> {
        let (_, limit) = clamp_page(1, limit);
        self.insights.find_unread(organization_id, limit).await
    }

    /// Semantic search over all insights.
    pub async fn search_insights(&self, query: &str, limit: i64) -> Result<Vec<Insight>> {
        let embedding = self.embed(query.to_string()).await?;
        let hits = self
            .insights
            .search_similar(&embedding, clamp_search_limit(limit))
            .await?;
        Ok(hits.into_iter().map(|(insight, _)| insight).collect())
    }

    pub async fn search_insights_by_org(
        &self,
        organization_id: Uuid,
        query: &str,
        limit: i64,
    ) -> Result<Vec<Insight>> {
        let embedding = self.embed(query.to_string()).await?;
        let hits = self
            .insights
            .search_similar_by_org(organization_id, &embedding, clamp_search_limit(limit))
            .await?;
        Ok(hits.into_iter().map(|(insight, _)| insight).collect())
    }

    /// Embed and store a generated insight, then stamp the topic's
    /// `last_insight_at` so the cooldown applies.
    pub async fn create_insight(&self, new: NewInsight) -> Result<Insight> {
        let embedding = self
            .embed(format!("{} {}", new.title, new.summary))
            .await?;

        let insight = Insight {
            id: pulse_core::new_v7(),
            organization_id: new.organization_id,
            topic_id: new.topic_id,
            title: new.title,
            summary: new.summary,
            content: new.content,
            key_points: new.key_points,
            source_content_ids: new.source_content_ids,
            embedding: Some(embedding),
            generated_at: Utc::now(),
            period_start: new.period_start,
            period_end: new.period_end,
            is_read: false,
            is_pinned: false,
            is_used_in_article: false,
            metadata: serde_json::json!({}),
        };
        self.insights.save(&insight).await?;

        if let Some(topic_id) = insight.topic_id {
            if let Err(e) = self
                .topics
                .update_last_insight_at(topic_id, insight.generated_at)
                .await
            {
                warn!(
                    subsystem = "jobs",
                    component = "insight",
                    op = "create_insight",
                    topic_id = %topic_id,
                    error = %e,
                    "Failed to stamp topic last_insight_at"
                );
            }
        }

        info!(
            subsystem = "jobs",
            component = "insight",
            op = "create_insight",
            insight_id = %insight.id,
            sources = insight.source_content_ids.len(),
            "Insight created"
        );
        Ok(insight)
    }

    pub async fn mark_read(&self, id: Uuid) -> Result<()> {
        if !self.insights.mark_as_read(id).await? {
            return Err(Error::NotFound(format!("insight {}", id)));
        }
        Ok(())
    }

    /// Flip the pin flag and return its new value.
    pub async fn toggle_pinned(&self, id: Uuid) -> Result<bool> {
        self.insights
            .toggle_pinned(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("insight {}", id)))
    }

    pub async fn mark_used_in_article(&self, id: Uuid) -> Result<()> {
        if !self.insights.mark_as_used_in_article(id).await? {
            return Err(Error::NotFound(format!("insight {}", id)));
        }
        Ok(())
    }

    pub async fn delete_insight(&self, id: Uuid) -> Result<()> {
        if !self.insights.delete(id).await? {
            return Err(Error::NotFound(format!("insight {}", id)));
        }
        Ok(())
    }

    pub async fn count_unread(&self, organization_id: Uuid) -> Result<i64> {
        self.insights.count_unread(organization_id).await
    }

    pub async fn count_all_unread(&self) -> Result<i64> {
        self.insights.count_all_unread().await
    }

    // =========================================================================
    // TOPICS
    // =========================================================================

    pub async fn get_topic(&self, id: Uuid) -> Result<InsightTopic> {
        self.topics
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("topic {}", id)))
    }

    pub async fn list_topics(&self, organization_id: Uuid) -> Result<Vec<InsightTopic>> {
        self.topics.find_by_organization(organization_id).await
    }

    pub async fn list_all_topics(&self) -> Result<Vec<InsightTopic>> {
        self.topics.find_all().await
    }

    pub async fn create_topic(
        &self,
        organization_id: Option<Uuid>,
        req: CreateTopicRequest,
    ) -> Result<InsightTopic> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput("topic name cannot be empty".to_string()));
        }

        let embedding = self
            .embed(InsightTopic::embedding_text(
                &name,
                req.description.as_deref(),
                &req.keywords,
            ))
            .await?;

        let now = Utc::now();
        let topic = InsightTopic {
            id: pulse_core::new_v7(),
            organization_id,
            name,
            description: req.description,
            keywords: req.keywords,
            embedding: Some(embedding),
            is_auto_generated: false,
            content_count: 0,
            last_insight_at: None,
            color: req.color,
            icon: req.icon,
            created_at: now,
            updated_at: now,
        };
        self.topics.save(&topic).await?;

        info!(
            subsystem = "jobs",
            component = "insight",
            op = "create_topic",
            topic_id = %topic.id,
            name = %topic.name,
            "Topic created"
        );
        Ok(topic)
    }

    /// Apply a partial update, re-embedding when the name, description, or
    /// keywords change.
    pub async fn update_topic(&self, id: Uuid, req: UpdateTopicRequest) -> Result<InsightTopic> {
        let mut topic = self.get_topic(id).await?;
        let mut text_changed = false;

        if let Some(name) = req.name.map(|n| n.trim().to_string()) {
            if name.is_empty() {
                return Err(Error::InvalidInput("topic name cannot be empty".to_string()));
            }
            text_changed |= name != topic.name;
            topic.name = name;
        }
        if let Some(description) = req.description {
            text_changed |= topic.description.as_deref() != Some(description.as_str());
            topic.description = Some(description);
        }
        if let Some(keywords) = req.keywords {
            text_changed |= keywords != topic.keywords;
            topic.keywords = keywords;
        }
        if req.color.is_some() {
            topic.color = req.color;
        }
        if req.icon.is_some() {
            topic.icon = req.icon;
        }

        if text_changed {
            let embedding = self
                .embed(InsightTopic::embedding_text(
                    &topic.name,
                    topic.description.as_deref(),
                    &topic.keywords,
                ))
                .await?;
            topic.embedding = Some(embedding);
        }
        topic.updated_at = Utc::now();

        self.topics.update(&topic).await?;
        debug!(
            subsystem = "jobs",
            component = "insight",
            op = "update_topic",
            topic_id = %id,
            reembedded = text_changed,
            "Topic updated"
        );
        Ok(topic)
    }

    pub async fn delete_topic(&self, id: Uuid) -> Result<()> {
        if !self.topics.delete(id).await? {
            return Err(Error::NotFound(format!("topic {}", id)));
        }
        Ok(())
    }

    /// Match a content item against every topic scoring at or above
    /// `threshold`. Only the best match is primary. Each matched topic's
    /// content count is recomputed afterwards.
    pub async fn match_content_to_topics(
        &self,
        content_id: Uuid,
        embedding: &Vector,
        threshold: f64,
    ) -> Result<Vec<ContentTopicMatch>> {
        let ranked = self
            .topics
            .search_similar(embedding, TOPIC_MATCH_LIMIT, threshold)
            .await?;
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let matches: Vec<ContentTopicMatch> = ranked
            .iter()
            .enumerate()
            .map(|(rank, (topic, score))| ContentTopicMatch {
                id: pulse_core::new_v7(),
                content_id,
                topic_id: topic.id,
                similarity_score: *score,
                is_primary: rank == 0,
                created_at: now,
            })
            .collect();
        self.matches.save_batch(&matches).await?;

        for m in &matches {
            let recount = match self.matches.count_by_topic(m.topic_id).await {
                Ok(count) => self.topics.update_content_count(m.topic_id, count).await,
                Err(e) => Err(e),
            };
            if let Err(e) = recount {
                warn!(
                    subsystem = "jobs",
                    component = "insight",
                    op = "match_content",
                    topic_id = %m.topic_id,
                    error = %e,
                    "Failed to refresh topic content count"
                );
            }
        }

        debug!(
            subsystem = "jobs",
            component = "insight",
            op = "match_content",
            content_id = %content_id,
            result_count = matches.len(),
            "Content matched to topics"
        );
        Ok(matches)
    }

    // =========================================================================
    // CONTENT SEARCH
    // =========================================================================

    pub async fn search_content(&self, query: &str, limit: i64) -> Result<Vec<ContentSearchHit>> {
        let embedding = self.embed(query.to_string()).await?;
        self.content
            .search_similar(&embedding, clamp_search_limit(limit))
            .await
    }

    pub async fn search_content_by_org(
        &self,
        organization_id: Uuid,
        query: &str,
        limit: i64,
    ) -> Result<Vec<ContentSearchHit>> {
        let embedding = self.embed(query.to_string()).await?;
        self.content
            .search_similar_by_org(organization_id, &embedding, clamp_search_limit(limit))
            .await
    }

    pub async fn recent_content(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CrawledContent>> {
        let (_, limit) = clamp_page(1, limit);
        self.content.find_recent_by_org(organization_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;
    use chrono::Duration;
    use pulse_core::defaults::TOPIC_MATCH_THRESHOLD;
    use pulse_inference::MockInferenceBackend;

    fn service(store: &InMemoryStore, backend: MockInferenceBackend) -> InsightService {
        InsightService::new(
            store.insights.clone(),
            store.topics.clone(),
            store.content.clone(),
            store.topic_matches.clone(),
            Arc::new(backend),
        )
    }

    fn topic(name: &str) -> InsightTopic {
        let now = Utc::now();
        InsightTopic {
            id: Uuid::new_v4(),
            organization_id: None,
            name: name.to_string(),
            description: None,
            keywords: Vec::new(),
            embedding: None,
            is_auto_generated: false,
            content_count: 0,
            last_insight_at: None,
            color: None,
            icon: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn new_insight(topic_id: Option<Uuid>) -> NewInsight {
        NewInsight {
            organization_id: Some(Uuid::new_v4()),
            topic_id,
            title: "Async runtimes".to_string(),
            summary: "Runtimes converged on work stealing.".to_string(),
            key_points: vec!["work stealing".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_match_content_marks_only_best_as_primary() {
        let store = InMemoryStore::new();
        let (a, b, c, d) = (topic("a"), topic("b"), topic("c"), topic("d"));
        let ids = (a.id, b.id, c.id, d.id);
        for t in [a, b, c, d] {
            store.topics.insert(t);
        }
        store
            .topics
            .script_similarity(vec![(ids.1, 0.75), (ids.0, 0.9), (ids.2, 0.61), (ids.3, 0.4)]);

        let svc = service(&store, MockInferenceBackend::new());
        let content_id = Uuid::new_v4();
        let matches = svc
            .match_content_to_topics(content_id, &Vector::from(vec![1.0; 4]), TOPIC_MATCH_THRESHOLD)
            .await
            .unwrap();

        assert_eq!(matches.len(), 3);
        let primary: Vec<_> = matches.iter().filter(|m| m.is_primary).collect();
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].topic_id, ids.0);
        assert!((primary[0].similarity_score - 0.9).abs() < f64::EPSILON);
        assert_eq!(store.topic_matches.all().len(), 3);

        // Counts are recomputed from stored matches
        assert_eq!(store.topics.get(ids.0).unwrap().content_count, 1);
        assert_eq!(store.topics.get(ids.2).unwrap().content_count, 1);
        assert_eq!(store.topics.get(ids.3).unwrap().content_count, 0);
    }

    #[tokio::test]
    async fn test_match_content_recount_is_idempotent() {
        let store = InMemoryStore::new();
        let t = topic("only");
        let id = t.id;
        store.topics.insert(t);
        store.topics.script_similarity(vec![(id, 0.8)]);

        let svc = service(&store, MockInferenceBackend::new());
        let content_id = Uuid::new_v4();
        let emb = Vector::from(vec![1.0; 4]);
        svc.match_content_to_topics(content_id, &emb, 0.6).await.unwrap();
        svc.match_content_to_topics(content_id, &emb, 0.6).await.unwrap();

        assert_eq!(store.topics.get(id).unwrap().content_count, 1);
    }

    #[tokio::test]
    async fn test_match_content_none_above_threshold() {
        let store = InMemoryStore::new();
        let t = topic("low");
        let id = t.id;
        store.topics.insert(t);
        store.topics.script_similarity(vec![(id, 0.3)]);

        let svc = service(&store, MockInferenceBackend::new());
        let matches = svc
            .match_content_to_topics(Uuid::new_v4(), &Vector::from(vec![1.0; 4]), 0.6)
            .await
            .unwrap();
        assert!(matches.is_empty());
        assert!(store.topic_matches.all().is_empty());
    }

    #[tokio::test]
    async fn test_create_insight_embeds_and_stamps_topic() {
        let store = InMemoryStore::new();
        let t = topic("runtimes");
        let topic_id = t.id;
        store.topics.insert(t);

        let backend = MockInferenceBackend::new();
        let svc = service(&store, backend.clone());
        let before = Utc::now();
        let insight = svc.create_insight(new_insight(Some(topic_id))).await.unwrap();

        assert!(insight.embedding.is_some());
        assert!(!insight.is_read);
        assert_eq!(backend.embed_call_count(), 1);
        assert_eq!(
            backend.get_calls()[0].input,
            "Async runtimes Runtimes converged on work stealing."
        );
        let stamped = store.topics.get(topic_id).unwrap().last_insight_at.unwrap();
        assert!(stamped >= before);
    }

    #[tokio::test]
    async fn test_create_insight_embedding_failure_stores_nothing() {
        let store = InMemoryStore::new();
        let svc = service(&store, MockInferenceBackend::new().with_embedding_failure());
        let err = svc.create_insight(new_insight(None)).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
        assert!(store.insights.all().is_empty());
    }

    #[tokio::test]
    async fn test_insight_flags() {
        let store = InMemoryStore::new();
        let svc = service(&store, MockInferenceBackend::new());
        let new = new_insight(None);
        let org = new.organization_id.unwrap();
        let insight = svc.create_insight(new).await.unwrap();

        assert_eq!(svc.count_unread(org).await.unwrap(), 1);
        svc.mark_read(insight.id).await.unwrap();
        assert_eq!(svc.count_unread(org).await.unwrap(), 0);
        assert_eq!(svc.count_all_unread().await.unwrap(), 0);

        assert!(svc.toggle_pinned(insight.id).await.unwrap());
        assert!(!svc.toggle_pinned(insight.id).await.unwrap());

        svc.mark_used_in_article(insight.id).await.unwrap();
        assert!(svc.get_insight(insight.id).await.unwrap().is_used_in_article);

        svc.delete_insight(insight.id).await.unwrap();
        assert!(svc.get_insight(insight.id).await.unwrap_err().is_not_found());
        assert!(svc.toggle_pinned(insight.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_create_topic_embeds_combined_text() {
        let store = InMemoryStore::new();
        let backend = MockInferenceBackend::new();
        let svc = service(&store, backend.clone());

        let topic = svc
            .create_topic(
                Some(Uuid::new_v4()),
                CreateTopicRequest {
                    name: "Databases".to_string(),
                    description: Some("Storage engines".to_string()),
                    keywords: vec!["postgres".to_string(), "lsm".to_string()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(topic.embedding.is_some());
        assert_eq!(backend.get_calls()[0].input, "Databases Storage engines postgres lsm");
        assert_eq!(store.topics.all().len(), 1);
    }

    #[tokio::test]
    async fn test_update_topic_reembeds_only_on_text_change() {
        let store = InMemoryStore::new();
        let backend = MockInferenceBackend::new();
        let svc = service(&store, backend.clone());
        let created = svc
            .create_topic(
                None,
                CreateTopicRequest {
                    name: "Databases".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(backend.embed_call_count(), 1);

        svc.update_topic(
            created.id,
            UpdateTopicRequest {
                color: Some("#ff0000".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(backend.embed_call_count(), 1);

        let updated = svc
            .update_topic(
                created.id,
                UpdateTopicRequest {
                    keywords: Some(vec!["sqlite".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(backend.embed_call_count(), 2);
        assert_eq!(updated.keywords, vec!["sqlite".to_string()]);
        assert_eq!(updated.color.as_deref(), Some("#ff0000"));
    }

    #[tokio::test]
    async fn test_get_insight_with_sources() {
        let store = InMemoryStore::new();
        let svc = service(&store, MockInferenceBackend::new());
        let insight = svc.create_insight(new_insight(None)).await.unwrap();
        let with = svc.get_insight_with_sources(insight.id).await.unwrap();
        assert!(with.sources.is_empty());
        assert_eq!(with.insight.id, insight.id);
    }

    #[tokio::test]
    async fn test_list_insights_by_topic_paginates() {
        let store = InMemoryStore::new();
        let svc = service(&store, MockInferenceBackend::new());
        let topic_id = Uuid::new_v4();
        for _ in 0..3 {
            svc.create_insight(new_insight(Some(topic_id))).await.unwrap();
        }
        let page = svc.list_insights_by_topic(topic_id, 2, 2).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 1);
        assert!(page.items[0].generated_at <= Utc::now() + Duration::seconds(1));
    }

    #[tokio::test]
    async fn test_search_insights_ranks_exact_text_first() {
        let store = InMemoryStore::new();
        let svc = service(&store, MockInferenceBackend::new());
        let first = svc.create_insight(new_insight(None)).await.unwrap();
        let mut other = new_insight(None);
        other.title = "Completely different".to_string();
        other.summary = "zzzz qqqq".to_string();
        svc.create_insight(other).await.unwrap();

        let hits = svc
            .search_insights("Async runtimes Runtimes converged on work stealing.", 0)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, first.id);
    }
}
