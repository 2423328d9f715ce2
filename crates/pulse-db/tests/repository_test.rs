//! Integration tests for the PostgreSQL repositories.
//!
//! This test suite validates:
//! - Data source insert, unique url conflict, and due-crawl selection
//! - Crawled content (source, url) uniqueness and lookup
//! - Topic match primaries and recomputed counts
//!
//! **IMPORTANT**: These tests require a PostgreSQL database with the pgvector
//! extension. They are ignored by default; run them with
//! `cargo test -p pulse-db --features migrations -- --ignored`.

use chrono::{Duration, Utc};
use pulse_core::{
    ContentTopicMatch, ContentTopicMatchRepository, CrawlFrequency, CrawlStatus, CrawledContent,
    CrawledContentRepository, DataSource, DataSourceRepository, Error, InsightTopic,
    InsightTopicRepository, SourceType, Vector,
};
use pulse_db::{Database, DEFAULT_TEST_DATABASE_URL};
use uuid::Uuid;

async fn setup_test_db() -> Database {
    let _ = dotenvy::dotenv();
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_TEST_DATABASE_URL.to_string());
    let db = Database::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    #[cfg(feature = "migrations")]
    db.migrate().await.expect("Failed to run migrations");
    db
}

fn sample_source(url: &str) -> DataSource {
    let now = Utc::now();
    DataSource {
        id: pulse_core::new_v7(),
        organization_id: Some(Uuid::new_v4()),
        user_id: None,
        name: "Test source".into(),
        url: url.to_string(),
        feed_url: None,
        source_type: SourceType::Blog,
        crawl_frequency: CrawlFrequency::Daily,
        is_enabled: true,
        is_discovered: false,
        discovered_from_id: None,
        last_crawled_at: None,
        next_crawl_at: Some(now - Duration::minutes(5)),
        crawl_status: CrawlStatus::Pending,
        error_message: None,
        content_count: 0,
        subscriber_count: 1,
        metadata: serde_json::json!({}),
        created_at: now,
        updated_at: now,
    }
}

fn unique_url(prefix: &str) -> String {
    format!("https://{}-{}.example.com", prefix, Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_data_source_duplicate_url_is_already_exists() {
    let db = setup_test_db().await;
    let url = unique_url("dup");

    db.data_sources.save(&sample_source(&url)).await.unwrap();
    let err = db.data_sources.save(&sample_source(&url)).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists(_)), "got {err:?}");
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_due_to_crawl_skips_crawling_and_future_sources() {
    let db = setup_test_db().await;

    let due = sample_source(&unique_url("due"));
    let mut future = sample_source(&unique_url("future"));
    future.next_crawl_at = Some(Utc::now() + Duration::hours(3));
    let crawling = sample_source(&unique_url("crawling"));

    for s in [&due, &future, &crawling] {
        db.data_sources.save(s).await.unwrap();
    }
    db.data_sources
        .update_crawl_status(crawling.id, CrawlStatus::Crawling, None)
        .await
        .unwrap();

    let batch = db.data_sources.find_due_to_crawl(1000).await.unwrap();
    let ids: Vec<Uuid> = batch.iter().map(|s| s.id).collect();
    assert!(ids.contains(&due.id));
    assert!(!ids.contains(&future.id));
    assert!(!ids.contains(&crawling.id));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_success_status_stamps_last_crawled_and_clears_error() {
    let db = setup_test_db().await;
    let source = sample_source(&unique_url("status"));
    db.data_sources.save(&source).await.unwrap();

    db.data_sources
        .update_crawl_status(source.id, CrawlStatus::Failed, Some("boom"))
        .await
        .unwrap();
    let failed = db.data_sources.find_by_id(source.id).await.unwrap().unwrap();
    assert_eq!(failed.crawl_status, CrawlStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("boom"));

    db.data_sources
        .update_crawl_status(source.id, CrawlStatus::Success, None)
        .await
        .unwrap();
    let ok = db.data_sources.find_by_id(source.id).await.unwrap().unwrap();
    assert_eq!(ok.crawl_status, CrawlStatus::Success);
    assert!(ok.error_message.is_none());
    assert!(ok.last_crawled_at.is_some());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_content_unique_per_source_and_match_counts() {
    let db = setup_test_db().await;
    let source = sample_source(&unique_url("content"));
    db.data_sources.save(&source).await.unwrap();

    let content = CrawledContent {
        id: pulse_core::new_v7(),
        data_source_id: source.id,
        url: format!("{}/post/1", source.url),
        title: Some("Post".into()),
        content: "Body text long enough".into(),
        summary: None,
        author: None,
        published_at: None,
        embedding: Some(Vector::from(vec![1.0, 0.0, 0.0])),
        metadata: serde_json::json!({}),
        created_at: Utc::now(),
    };
    db.content.save(&content).await.unwrap();
    let mut dup = content.clone();
    dup.id = pulse_core::new_v7();
    assert!(matches!(
        db.content.save(&dup).await.unwrap_err(),
        Error::AlreadyExists(_)
    ));
    assert!(db
        .content
        .find_by_url(source.id, &content.url)
        .await
        .unwrap()
        .is_some());

    let now = Utc::now();
    let topic = InsightTopic {
        id: pulse_core::new_v7(),
        organization_id: source.organization_id,
        name: "Topic".into(),
        description: None,
        keywords: vec![],
        embedding: Some(Vector::from(vec![1.0, 0.0, 0.0])),
        is_auto_generated: false,
        content_count: 0,
        last_insight_at: None,
        color: None,
        icon: None,
        created_at: now,
        updated_at: now,
    };
    db.topics.save(&topic).await.unwrap();

    let m = ContentTopicMatch {
        id: pulse_core::new_v7(),
        content_id: content.id,
        topic_id: topic.id,
        similarity_score: 0.9,
        is_primary: true,
        created_at: now,
    };
    db.topic_matches.save_batch(&[m.clone()]).await.unwrap();
    // Re-saving the same pair overwrites rather than duplicating.
    db.topic_matches.save_batch(&[m]).await.unwrap();

    assert_eq!(db.topic_matches.count_by_topic(topic.id).await.unwrap(), 1);
    let (primaries, total) = db
        .topic_matches
        .find_primary_by_topic(topic.id, 0, 10)
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(primaries[0].content_id, content.id);

    let hits = db
        .topics
        .search_similar(&Vector::from(vec![1.0, 0.0, 0.0]), 10, 0.6)
        .await
        .unwrap();
    assert!(hits.iter().any(|(t, score)| t.id == topic.id && *score > 0.99));
}
