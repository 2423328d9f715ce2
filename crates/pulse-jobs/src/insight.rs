//! Insight worker: summarizes recent content per topic with an LLM.
//!
//! A topic gets a new insight when it is outside its cooldown and has at
//! least [`INSIGHT_MIN_CONTENT`] primary content matches. The newest
//! matches are rendered into a prompt, the model's structured reply is
//! parsed, and the result is stored through [`InsightService`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pulse_core::defaults::{
    INSIGHT_ARTICLE_MAX_CHARS, INSIGHT_COOLDOWN_HOURS, INSIGHT_DEFAULT_PERIOD_DAYS,
    INSIGHT_DEFAULT_TITLE, INSIGHT_MAX_CONTENT, INSIGHT_MIN_CONTENT,
};
use pulse_core::{
    ContentTopicMatchRepository, CrawledContent, CrawledContentRepository, Error,
    GenerationBackend, InsightTopic, NewInsight, Result, WorkerState,
};
use pulse_db::Database;

use crate::extract::truncate_with_ellipsis;
use crate::manager::Worker;
use crate::services::InsightService;
use crate::status::StatusService;

pub const INSIGHT_WORKER_NAME: &str = "insight";

pub const SYSTEM_PROMPT: &str = r#"You are an expert content analyst and writer. Your task is to analyze multiple articles on a specific topic and generate a comprehensive insight summary.

Your output should include:
1. A compelling title for the insight
2. A 2-3 sentence summary
3. A full "mini blog" content (2-4 paragraphs) that synthesizes the key information
4. 3-5 key takeaways as bullet points

Format your response exactly as follows:
TITLE: [Your title here]
SUMMARY: [Your 2-3 sentence summary]
CONTENT: [Your full mini blog content]
KEY_POINTS:
- [Point 1]
- [Point 2]
- [Point 3]"#;

const TITLE_MARKER: &str = "TITLE:";
const SUMMARY_MARKER: &str = "SUMMARY:";
const CONTENT_MARKER: &str = "CONTENT:";
const KEY_POINTS_MARKER: &str = "KEY_POINTS:";

/// Structured fields parsed from a model reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedInsight {
    pub title: String,
    pub summary: String,
    pub content: Option<String>,
    pub key_points: Vec<String>,
}

/// Render articles as numbered prompt sections.
pub fn build_content_summary(contents: &[CrawledContent]) -> String {
    let mut out = String::new();
    for (i, c) in contents.iter().enumerate() {
        out.push_str(&format!("## Article {}\n", i + 1));
        if let Some(title) = &c.title {
            out.push_str(&format!("Title: {}\n", title));
        }
        out.push_str(&format!("URL: {}\n", c.url));
        if let Some(published) = c.published_at {
            out.push_str(&format!("Published: {}\n", published.format("%Y-%m-%d")));
        }
        let body = truncate_with_ellipsis(&c.content, INSIGHT_ARTICLE_MAX_CHARS);
        out.push_str(&format!("\nContent:\n{}\n\n", body));
        out.push_str("---\n\n");
    }
    out
}

pub fn build_user_prompt(topic: &InsightTopic, content_summary: &str) -> String {
    format!(
        "Topic: {}\nDescription: {}\n\nPlease analyze the following articles and generate an insight:\n\n{}",
        topic.name,
        topic.description.as_deref().unwrap_or(""),
        content_summary
    )
}

/// Text after `marker` up to the first of `ends` (or the end of the reply).
fn section<'a>(response: &'a str, marker: &str, ends: &[&str]) -> Option<&'a str> {
    let start = response.find(marker)? + marker.len();
    let rest = &response[start..];
    let end = ends
        .iter()
        .find_map(|e| rest.find(e))
        .unwrap_or(rest.len());
    Some(rest[..end].trim())
}

/// Parse a `TITLE:/SUMMARY:/CONTENT:/KEY_POINTS:` reply.
///
/// A missing title falls back to [`INSIGHT_DEFAULT_TITLE`]; a missing or
/// empty summary is an error.
pub fn parse_insight_response(response: &str) -> Result<ParsedInsight> {
    if response.trim().is_empty() {
        return Err(Error::Inference("no response from LLM".to_string()));
    }

    let title = section(response, TITLE_MARKER, &["\n"])
        .filter(|t| !t.is_empty())
        .unwrap_or(INSIGHT_DEFAULT_TITLE)
        .to_string();
    let summary = section(response, SUMMARY_MARKER, &[CONTENT_MARKER, KEY_POINTS_MARKER])
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Inference("LLM response has no summary".to_string()))?
        .to_string();
    let content = section(response, CONTENT_MARKER, &[KEY_POINTS_MARKER])
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    let key_points = response
        .find(KEY_POINTS_MARKER)
        .map(|idx| {
            response[idx + KEY_POINTS_MARKER.len()..]
                .lines()
                .map(str::trim)
                .filter_map(|l| l.strip_prefix('-').or_else(|| l.strip_prefix('•')))
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(ParsedInsight {
        title,
        summary,
        content,
        key_points,
    })
}

/// Earliest and latest publication times, or the trailing default window
/// when no item has one.
pub fn insight_period(
    contents: &[CrawledContent],
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let dates = contents.iter().filter_map(|c| c.published_at);
    match (dates.clone().min(), dates.max()) {
        (Some(start), Some(end)) => (start, end),
        _ => (now - Duration::days(INSIGHT_DEFAULT_PERIOD_DAYS), now),
    }
}

/// True while the topic's last insight is younger than the cooldown.
pub fn in_cooldown(topic: &InsightTopic, now: DateTime<Utc>) -> bool {
    topic
        .last_insight_at
        .is_some_and(|at| now - at < Duration::hours(INSIGHT_COOLDOWN_HOURS))
}

pub struct InsightWorker {
    insights: InsightService,
    matches: Arc<dyn ContentTopicMatchRepository>,
    content: Arc<dyn CrawledContentRepository>,
    generator: Option<Arc<dyn GenerationBackend>>,
    status: Arc<StatusService>,
}

impl InsightWorker {
    /// Without a generation backend every run is a logged no-op.
    pub fn new(
        insights: InsightService,
        matches: Arc<dyn ContentTopicMatchRepository>,
        content: Arc<dyn CrawledContentRepository>,
        generator: Option<Arc<dyn GenerationBackend>>,
        status: Arc<StatusService>,
    ) -> Self {
        Self {
            insights,
            matches,
            content,
            generator,
            status,
        }
    }

    pub fn from_database(
        db: &Database,
        insights: InsightService,
        generator: Option<Arc<dyn GenerationBackend>>,
        status: Arc<StatusService>,
    ) -> Self {
        Self::new(
            insights,
            db.topic_matches.clone(),
            db.content.clone(),
            generator,
            status,
        )
    }

    /// Returns true when an insight was stored.
    async fn generate_for_topic(
        &self,
        generator: &dyn GenerationBackend,
        topic: &InsightTopic,
    ) -> Result<bool> {
        if in_cooldown(topic, Utc::now()) {
            debug!(
                subsystem = "jobs",
                component = "insight",
                topic_id = %topic.id,
                "Recent insight exists, skipping"
            );
            return Ok(false);
        }

        let (matches, total) = self
            .matches
            .find_primary_by_topic(topic.id, 0, INSIGHT_MAX_CONTENT)
            .await?;
        if total < INSIGHT_MIN_CONTENT {
            debug!(
                subsystem = "jobs",
                component = "insight",
                topic_id = %topic.id,
                result_count = total,
                "Not enough content for insight generation"
            );
            return Ok(false);
        }

        let content_ids: Vec<_> = matches.iter().map(|m| m.content_id).collect();
        let contents = self.content.find_by_ids(&content_ids).await?;
        if (contents.len() as i64) < INSIGHT_MIN_CONTENT {
            return Ok(false);
        }

        let prompt = build_user_prompt(topic, &build_content_summary(&contents));
        let reply = generator.generate_with_system(SYSTEM_PROMPT, &prompt).await?;
        let parsed = parse_insight_response(&reply)?;
        let (period_start, period_end) = insight_period(&contents, Utc::now());

        let insight = self
            .insights
            .create_insight(NewInsight {
                organization_id: topic.organization_id,
                topic_id: Some(topic.id),
                title: parsed.title,
                summary: parsed.summary,
                content: parsed.content,
                key_points: parsed.key_points,
                source_content_ids: content_ids,
                period_start: Some(period_start),
                period_end: Some(period_end),
            })
            .await?;

        info!(
            subsystem = "jobs",
            component = "insight",
            topic_id = %topic.id,
            insight_id = %insight.id,
            title = %insight.title,
            "Generated insight for topic"
        );
        Ok(true)
    }
}

#[async_trait]
impl Worker for InsightWorker {
    fn name(&self) -> &str {
        INSIGHT_WORKER_NAME
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let name = INSIGHT_WORKER_NAME;
        let Some(generator) = self.generator.as_deref() else {
            warn!(
                subsystem = "jobs",
                component = "insight",
                "LLM provider not configured, skipping insight generation"
            );
            self.status
                .update_status(name, WorkerState::Running, 100, "LLM not configured, skipping")
                .await;
            return Ok(());
        };

        self.status
            .update_status(name, WorkerState::Running, 0, "Fetching topics...")
            .await;
        let topics = self.insights.list_all_topics().await?;
        if topics.is_empty() {
            info!(subsystem = "jobs", component = "insight", "No topics found");
            self.status
                .update_status(name, WorkerState::Running, 100, "No topics found")
                .await;
            return Ok(());
        }

        let total = topics.len() as u64;
        self.status
            .set_progress(name, 0, total, &format!("Found {} topics to process", total))
            .await;

        let mut generated = 0;
        for (i, topic) in topics.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(name.to_string()));
            }
            self.status
                .set_progress(
                    name,
                    i as u64,
                    total,
                    &format!("Generating insight for: {}", topic.name),
                )
                .await;

            match self.generate_for_topic(generator, topic).await {
                Ok(true) => generated += 1,
                Ok(false) => {}
                Err(e) => error!(
                    subsystem = "jobs",
                    component = "insight",
                    topic_id = %topic.id,
                    error = %e,
                    "Failed to generate insight for topic"
                ),
            }
        }

        info!(
            subsystem = "jobs",
            component = "insight",
            result_count = generated,
            "Insight run completed"
        );
        self.status
            .set_progress(
                name,
                total,
                total,
                &format!("Completed processing {} topics", total),
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;
    use pulse_core::{ContentTopicMatch, CrawledContentRepository, EmbeddingBackend};
    use pulse_inference::MockInferenceBackend;
    use uuid::Uuid;

    const REPLY: &str = "TITLE: Rust adoption grows\nSUMMARY: More teams ship Rust.\nIt keeps growing.\nCONTENT: Paragraph one.\n\nParagraph two.\nKEY_POINTS:\n- Memory safety\n• Tooling\n  - Hiring\nnot a point\n";

    fn topic(last_insight_at: Option<DateTime<Utc>>) -> InsightTopic {
        let now = Utc::now();
        InsightTopic {
            id: Uuid::new_v4(),
            organization_id: Some(Uuid::new_v4()),
            name: "Rust".to_string(),
            description: Some("Systems programming".to_string()),
            keywords: Vec::new(),
            embedding: None,
            is_auto_generated: false,
            content_count: 0,
            last_insight_at,
            color: None,
            icon: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn content(i: usize, published_at: Option<DateTime<Utc>>) -> CrawledContent {
        CrawledContent {
            id: Uuid::new_v4(),
            data_source_id: Uuid::new_v4(),
            url: format!("https://example.com/post/{i}"),
            title: Some(format!("Post {i}")),
            content: format!("Body of post {i}"),
            summary: None,
            author: None,
            published_at,
            embedding: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    struct Harness {
        store: InMemoryStore,
        backend: MockInferenceBackend,
        status: Arc<StatusService>,
    }

    impl Harness {
        fn new(backend: MockInferenceBackend) -> Self {
            Self {
                store: InMemoryStore::new(),
                backend,
                status: Arc::new(StatusService::new()),
            }
        }

        fn worker(&self, with_llm: bool) -> InsightWorker {
            let embedder: Arc<dyn EmbeddingBackend> = Arc::new(self.backend.clone());
            let insights = InsightService::new(
                self.store.insights.clone(),
                self.store.topics.clone(),
                self.store.content.clone(),
                self.store.topic_matches.clone(),
                embedder,
            );
            let generator: Option<Arc<dyn GenerationBackend>> = if with_llm {
                Some(Arc::new(self.backend.clone()))
            } else {
                None
            };
            InsightWorker::new(
                insights,
                self.store.topic_matches.clone(),
                self.store.content.clone(),
                generator,
                self.status.clone(),
            )
        }

        /// Store `n` items as primary matches of `topic`.
        async fn seed(&self, topic: &InsightTopic, n: usize) {
            for i in 0..n {
                let c = content(i, None);
                self.store.content.save(&c).await.unwrap();
                self.store.topic_matches.insert(ContentTopicMatch {
                    id: Uuid::new_v4(),
                    content_id: c.id,
                    topic_id: topic.id,
                    similarity_score: 0.9,
                    is_primary: true,
                    created_at: Utc::now(),
                });
            }
        }
    }

    #[test]
    fn test_parse_full_response() {
        let parsed = parse_insight_response(REPLY).unwrap();
        assert_eq!(parsed.title, "Rust adoption grows");
        assert_eq!(parsed.summary, "More teams ship Rust.\nIt keeps growing.");
        assert_eq!(parsed.content.as_deref(), Some("Paragraph one.\n\nParagraph two."));
        assert_eq!(parsed.key_points, vec!["Memory safety", "Tooling", "Hiring"]);
    }

    #[test]
    fn test_parse_missing_title_uses_default() {
        let parsed = parse_insight_response("SUMMARY: Only a summary.").unwrap();
        assert_eq!(parsed.title, INSIGHT_DEFAULT_TITLE);
        assert_eq!(parsed.summary, "Only a summary.");
        assert!(parsed.content.is_none());
        assert!(parsed.key_points.is_empty());
    }

    #[test]
    fn test_parse_summary_ends_at_key_points_without_content() {
        let parsed = parse_insight_response("TITLE: T\nSUMMARY: S\nKEY_POINTS:\n- a").unwrap();
        assert_eq!(parsed.summary, "S");
        assert_eq!(parsed.key_points, vec!["a"]);
    }

    #[test]
    fn test_parse_without_summary_is_error() {
        let err = parse_insight_response("TITLE: Lonely title").unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
        assert!(parse_insight_response("   ").is_err());
    }

    #[test]
    fn test_content_summary_format() {
        let published = DateTime::parse_from_rfc3339("2024-06-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut long = content(1, Some(published));
        long.content = "x".repeat(INSIGHT_ARTICLE_MAX_CHARS + 10);
        let mut untitled = content(2, None);
        untitled.title = None;

        let summary = build_content_summary(&[long, untitled]);
        assert!(summary.starts_with("## Article 1\nTitle: Post 1\nURL: https://example.com/post/1\nPublished: 2024-06-01\n\nContent:\n"));
        assert!(summary.contains(&format!("{}...\n\n---\n\n", "x".repeat(INSIGHT_ARTICLE_MAX_CHARS))));
        assert!(summary.contains("## Article 2\nURL: https://example.com/post/2\n\nContent:\nBody of post 2\n\n---\n\n"));
    }

    #[test]
    fn test_user_prompt() {
        let prompt = build_user_prompt(&topic(None), "ARTICLES");
        assert_eq!(
            prompt,
            "Topic: Rust\nDescription: Systems programming\n\nPlease analyze the following articles and generate an insight:\n\nARTICLES"
        );
    }

    #[test]
    fn test_period_bounds() {
        let now = Utc::now();
        let a = now - Duration::days(3);
        let b = now - Duration::days(1);
        let (start, end) = insight_period(&[content(1, Some(b)), content(2, None), content(3, Some(a))], now);
        assert_eq!((start, end), (a, b));

        let (start, end) = insight_period(&[content(1, None)], now);
        assert_eq!(end, now);
        assert_eq!(start, now - Duration::days(INSIGHT_DEFAULT_PERIOD_DAYS));
    }

    #[tokio::test]
    async fn test_without_llm_is_noop() {
        let h = Harness::new(MockInferenceBackend::new());
        h.worker(false).run(CancellationToken::new()).await.unwrap();
        let s = h.status.get_status(INSIGHT_WORKER_NAME).await.unwrap();
        assert_eq!(s.message, "LLM not configured, skipping");
    }

    #[tokio::test]
    async fn test_no_topics() {
        let h = Harness::new(MockInferenceBackend::new());
        h.worker(true).run(CancellationToken::new()).await.unwrap();
        let s = h.status.get_status(INSIGHT_WORKER_NAME).await.unwrap();
        assert_eq!(s.message, "No topics found");
    }

    #[tokio::test]
    async fn test_recent_insight_is_in_cooldown() {
        let h = Harness::new(MockInferenceBackend::new().with_fixed_response(REPLY));
        let t = topic(Some(Utc::now() - Duration::hours(2)));
        h.seed(&t, 3).await;
        h.store.topics.insert(t);

        h.worker(true).run(CancellationToken::new()).await.unwrap();

        assert_eq!(h.backend.generate_call_count(), 0);
        assert!(h.store.insights.all().is_empty());
    }

    #[tokio::test]
    async fn test_old_insight_allows_generation() {
        let h = Harness::new(MockInferenceBackend::new().with_fixed_response(REPLY));
        let t = topic(Some(Utc::now() - Duration::hours(30)));
        let topic_id = t.id;
        h.seed(&t, 3).await;
        h.store.topics.insert(t);

        h.worker(true).run(CancellationToken::new()).await.unwrap();

        let stored = h.store.insights.all();
        assert_eq!(stored.len(), 1);
        let insight = &stored[0];
        assert_eq!(insight.title, "Rust adoption grows");
        assert_eq!(insight.topic_id, Some(topic_id));
        assert_eq!(insight.source_content_ids.len(), 3);
        assert_eq!(insight.key_points.len(), 3);
        assert!(insight.period_start.unwrap() < insight.period_end.unwrap());

        let calls = h.backend.get_calls();
        let gen = calls.iter().find(|c| c.operation == "generate").unwrap();
        assert_eq!(gen.system.as_deref(), Some(SYSTEM_PROMPT));
        assert!(gen.input.starts_with("Topic: Rust\n"));

        let refreshed = h.store.topics.get(topic_id).unwrap();
        assert!(refreshed.last_insight_at.unwrap() > Utc::now() - Duration::minutes(1));
    }

    #[tokio::test]
    async fn test_too_few_matches_skips() {
        let h = Harness::new(MockInferenceBackend::new().with_fixed_response(REPLY));
        let t = topic(None);
        h.seed(&t, 2).await;
        h.store.topics.insert(t);

        h.worker(true).run(CancellationToken::new()).await.unwrap();

        assert_eq!(h.backend.generate_call_count(), 0);
        let s = h.status.get_status(INSIGHT_WORKER_NAME).await.unwrap();
        assert_eq!(s.message, "Completed processing 1 topics");
    }

    #[tokio::test]
    async fn test_generation_failure_is_per_topic() {
        let h = Harness::new(MockInferenceBackend::new().with_generation_failure());
        let t = topic(None);
        h.seed(&t, 3).await;
        h.store.topics.insert(t);

        h.worker(true).run(CancellationToken::new()).await.unwrap();

        assert_eq!(h.backend.generate_call_count(), 1);
        assert!(h.store.insights.all().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_reply_stores_nothing() {
        let h = Harness::new(MockInferenceBackend::new().with_fixed_response("no markers here"));
        let t = topic(None);
        h.seed(&t, 4).await;
        h.store.topics.insert(t);

        h.worker(true).run(CancellationToken::new()).await.unwrap();

        assert!(h.store.insights.all().is_empty());
    }
}
