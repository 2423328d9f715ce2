//! End-to-end pipeline tests over the in-memory store.
//!
//! A wiremock server plays a small blog. The crawl worker is run through
//! the manager, its content is matched to a topic, and the insight worker
//! then summarizes that topic with a mock model.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pulse_inference::MockInferenceBackend;
use pulse_jobs::testing::InMemoryStore;
use pulse_jobs::{
    CrawlStatus, CrawlWorker, CreateDataSourceRequest, CreateTopicRequest, DataSourceService,
    EmbeddingBackend, GenerationBackend, InsightService, InsightWorker, StatusService, Worker,
    WorkerManager, WorkerState, CRAWL_WORKER_NAME,
};

const REPLY: &str = "TITLE: Borrow checker notes\nSUMMARY: Three posts on ownership.\nCONTENT: Longer text.\nKEY_POINTS:\n- Moves\n- Borrows\n";

fn page(title: &str, body: &str) -> String {
    format!(
        "<html><head><title>{title}</title></head><body><article><p>{body}</p></article></body></html>"
    )
}

async fn blog() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<a href="/post/one">1</a><a href="/post/two">2</a><a href="/post/three">3</a>"#,
            "text/html",
        ))
        .mount(&server)
        .await;
    for (slug, body) in [
        ("one", "Ownership moves values between bindings."),
        ("two", "Borrowing lends access without moving."),
        ("three", "Lifetimes bound how long borrows live."),
    ] {
        Mock::given(method("GET"))
            .and(path(format!("/post/{slug}")))
            .respond_with(ResponseTemplate::new(200).set_body_raw(page(slug, body), "text/html"))
            .mount(&server)
            .await;
    }
    server
}

struct Pipeline {
    store: InMemoryStore,
    backend: MockInferenceBackend,
    status: Arc<StatusService>,
    sources: DataSourceService,
    insights: InsightService,
}

impl Pipeline {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let backend = MockInferenceBackend::new().with_fixed_response(REPLY);
        let embedder: Arc<dyn EmbeddingBackend> = Arc::new(backend.clone());
        let sources = DataSourceService::new(store.data_sources.clone(), store.content.clone());
        let insights = InsightService::new(
            store.insights.clone(),
            store.topics.clone(),
            store.content.clone(),
            store.topic_matches.clone(),
            embedder,
        );
        Self {
            store,
            backend,
            status: Arc::new(StatusService::new()),
            sources,
            insights,
        }
    }

    fn crawl_worker(&self) -> CrawlWorker {
        CrawlWorker::new(
            self.sources.clone(),
            self.insights.clone(),
            self.store.content.clone(),
            Arc::new(self.backend.clone()),
            self.status.clone(),
        )
        .unwrap()
    }

    fn insight_worker(&self) -> InsightWorker {
        let generator: Arc<dyn GenerationBackend> = Arc::new(self.backend.clone());
        InsightWorker::new(
            self.insights.clone(),
            self.store.topic_matches.clone(),
            self.store.content.clone(),
            Some(generator),
            self.status.clone(),
        )
    }
}

async fn wait_idle(manager: &WorkerManager, name: &str) {
    for _ in 0..500 {
        if !manager.is_worker_running(name).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("worker {name} never finished");
}

#[tokio::test]
async fn test_crawl_match_and_summarize() {
    let server = blog().await;
    let p = Pipeline::new();
    let org = Uuid::new_v4();

    let source = p
        .sources
        .create(
            Some(org),
            None,
            CreateDataSourceRequest {
                name: "Rust blog".to_string(),
                url: server.uri(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    p.sources.trigger_crawl(source.id).await.unwrap();

    let topic = p
        .insights
        .create_topic(
            Some(org),
            CreateTopicRequest {
                name: "Ownership".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    // Every stored item scores above the match threshold for this topic
    p.store.topics.script_similarity(vec![(topic.id, 0.82)]);

    let manager = WorkerManager::new(p.status.clone());
    manager.register_worker(Arc::new(p.crawl_worker())).await;
    manager.run_worker_now(CRAWL_WORKER_NAME).await.unwrap();
    wait_idle(&manager, CRAWL_WORKER_NAME).await;

    let crawl_status = p.status.get_status(CRAWL_WORKER_NAME).await.unwrap();
    assert_eq!(crawl_status.state, WorkerState::Completed);
    let crawled = p.store.data_sources.get(source.id).unwrap();
    assert_eq!(crawled.crawl_status, CrawlStatus::Success);
    assert_eq!(crawled.content_count, 3);
    assert_eq!(p.store.topics.get(topic.id).unwrap().content_count, 3);

    p.insight_worker().run(CancellationToken::new()).await.unwrap();

    let insights = p.store.insights.all();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].title, "Borrow checker notes");
    assert_eq!(insights[0].organization_id, Some(org));
    assert_eq!(insights[0].key_points, vec!["Moves", "Borrows"]);

    let with_sources = p.insights.get_insight_with_sources(insights[0].id).await.unwrap();
    assert_eq!(with_sources.sources.len(), 3);

    // A second pass inside the cooldown generates nothing new
    p.insight_worker().run(CancellationToken::new()).await.unwrap();
    assert_eq!(p.store.insights.all().len(), 1);
    assert_eq!(p.backend.generate_call_count(), 1);
}
