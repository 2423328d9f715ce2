//! Integration tests for pulse-core models and their serialized forms.

use chrono::{Duration, Utc};
use pulse_core::{
    CrawlFrequency, CrawlStatus, CreateDataSourceRequest, SourceType, StatusUpdate, WorkerState,
    WorkerStatus,
};

#[test]
fn hourly_next_crawl_is_about_one_hour_out() {
    let now = Utc::now();
    let next = CrawlFrequency::Hourly.next_crawl_at(now);
    let delta = next - now;
    assert!(delta >= Duration::minutes(59) && delta <= Duration::minutes(61));
}

#[test]
fn create_request_deserializes_with_defaults() {
    let req: CreateDataSourceRequest =
        serde_json::from_str(r#"{"name": "Blog", "url": "https://blog.example.com"}"#).unwrap();
    assert_eq!(req.name, "Blog");
    assert!(req.source_type.is_none());
    assert!(req.crawl_frequency.is_none());
    assert!(req.is_enabled.is_none());
}

#[test]
fn create_request_accepts_lowercase_enums() {
    let req: CreateDataSourceRequest = serde_json::from_str(
        r#"{"name": "Feed", "url": "https://x.example.com", "source_type": "rss", "crawl_frequency": "weekly"}"#,
    )
    .unwrap();
    assert_eq!(req.source_type, Some(SourceType::Rss));
    assert_eq!(req.crawl_frequency, Some(CrawlFrequency::Weekly));
}

#[test]
fn status_update_serializes_state_lowercase() {
    let mut status = WorkerStatus::idle("insight");
    status.state = WorkerState::Completed;
    status.progress = 100;
    let update = StatusUpdate {
        worker_name: "insight".into(),
        status,
        timestamp: Utc::now(),
    };
    let json = serde_json::to_value(&update).unwrap();
    assert_eq!(json["status"]["state"], "completed");
    assert_eq!(json["status"]["progress"], 100);
}

#[test]
fn crawl_status_display_matches_storage_form() {
    assert_eq!(CrawlStatus::Pending.to_string(), "pending");
    assert_eq!(CrawlStatus::Success.to_string(), "success");
}
