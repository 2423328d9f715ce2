//! Integration tests for the worker supervisor and status service.
//!
//! This test suite validates:
//! - At most one run per worker name (AlreadyRunning while in flight)
//! - stop_worker on an idle worker is NotRunning; after stop the name is
//!   no longer listed as running
//! - stop() cancels every in-flight run and is idempotent
//! - Status lifecycle as seen by a subscriber

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use pulse_jobs::manager::{STOPPED_BY_SHUTDOWN, STOPPED_BY_USER};
use pulse_jobs::{Error, Result, StatusService, Worker, WorkerManager, WorkerState};

/// Runs until cancelled or released.
struct GateWorker {
    name: String,
    started: Notify,
    release: Notify,
    runs: AtomicUsize,
}

impl GateWorker {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            started: Notify::new(),
            release: Notify::new(),
            runs: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Worker for GateWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled(self.name.clone())),
            _ = self.release.notified() => Ok(()),
        }
    }
}

struct FailingWorker;

#[async_trait]
impl Worker for FailingWorker {
    fn name(&self) -> &str {
        "failing"
    }

    async fn run(&self, _cancel: CancellationToken) -> Result<()> {
        Err(Error::Internal("boom".to_string()))
    }
}

fn manager() -> WorkerManager {
    WorkerManager::with_shutdown_timeout(Arc::new(StatusService::new()), Duration::from_secs(5))
}

async fn wait_idle(manager: &WorkerManager, name: &str) {
    for _ in 0..300 {
        if !manager.is_worker_running(name).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("worker {name} never finished");
}

#[tokio::test]
async fn test_already_running_while_in_flight_then_runs_again() {
    let m = manager();
    let worker = GateWorker::new("gate");
    m.register_worker(worker.clone()).await;

    m.run_worker_now("gate").await.unwrap();
    worker.started.notified().await;

    let err = m.run_worker_now("gate").await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning(_)));
    assert_eq!(m.running_workers().await, vec!["gate".to_string()]);

    worker.release.notify_one();
    wait_idle(&m, "gate").await;

    let status = m.status().get_status("gate").await.unwrap();
    assert_eq!(status.state, WorkerState::Completed);

    m.run_worker_now("gate").await.unwrap();
    worker.started.notified().await;
    worker.release.notify_one();
    wait_idle(&m, "gate").await;
    assert_eq!(worker.runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stop_worker_cancels_and_clears_running() {
    let m = manager();
    let worker = GateWorker::new("gate");
    m.register_worker(worker.clone()).await;

    let err = m.stop_worker("gate").await.unwrap_err();
    assert!(matches!(err, Error::NotRunning(_)));

    m.run_worker_now("gate").await.unwrap();
    worker.started.notified().await;
    m.stop_worker("gate").await.unwrap();

    assert!(!m.is_worker_running("gate").await);
    assert!(m.running_workers().await.is_empty());
    let status = m.status().get_status("gate").await.unwrap();
    assert_eq!(status.state, WorkerState::Failed);
    assert_eq!(status.error.as_deref(), Some(STOPPED_BY_USER));

    let err = m.stop_worker("gate").await.unwrap_err();
    assert!(matches!(err, Error::NotRunning(_)));
}

#[tokio::test]
async fn test_failed_run_records_error() {
    let m = manager();
    m.register_worker(Arc::new(FailingWorker)).await;

    m.run_worker_now("failing").await.unwrap();
    wait_idle(&m, "failing").await;

    let status = m.status().get_status("failing").await.unwrap();
    assert_eq!(status.state, WorkerState::Failed);
    assert!(status.error.unwrap().contains("boom"));
}

#[tokio::test]
async fn test_stop_cancels_all_runs_and_is_idempotent() {
    let m = manager();
    let a = GateWorker::new("a");
    let b = GateWorker::new("b");
    m.register_worker(a.clone()).await;
    m.register_worker(b.clone()).await;
    m.schedule_worker("a", "0 0 0 1 1 *").await.unwrap();
    m.start().await.unwrap();
    assert!(m.is_running().await);

    m.run_worker_now("a").await.unwrap();
    m.run_worker_now("b").await.unwrap();
    a.started.notified().await;
    b.started.notified().await;

    m.stop().await.unwrap();

    assert!(!m.is_running().await);
    assert!(m.running_workers().await.is_empty());
    for name in ["a", "b"] {
        let status = m.status().get_status(name).await.unwrap();
        assert_eq!(status.state, WorkerState::Failed);
        assert_eq!(status.error.as_deref(), Some(STOPPED_BY_SHUTDOWN));
    }

    m.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let m = manager();
    m.start().await.unwrap();
    m.start().await.unwrap();
    assert!(m.is_running().await);
    m.stop().await.unwrap();
}

#[tokio::test]
async fn test_subscriber_sees_start_and_complete() {
    let status = StatusService::new();
    status.register_worker("crawl").await;
    let mut sub = status.subscribe().await;

    status.start_worker("crawl").await;
    status.set_progress("crawl", 0, 0, "Nothing to do").await;
    status.complete_worker("crawl", "Done").await;

    let started = sub.recv().await.unwrap();
    assert_eq!(started.worker_name, "crawl");
    assert_eq!(started.status.state, WorkerState::Running);
    assert_eq!(started.status.message, "Starting...");

    let progress = sub.recv().await.unwrap();
    assert_eq!(progress.status.progress, 0);
    assert_eq!(progress.status.items_total, 0);

    let done = sub.recv().await.unwrap();
    assert_eq!(done.status.state, WorkerState::Completed);
    assert_eq!(done.status.progress, 100);
    assert!(done.status.completed_at.is_some());
}
