//! Worker supervisor: registration, cron scheduling, on-demand runs, and
//! cooperative cancellation.
//!
//! Each run executes in its own spawned task. At most one run per worker
//! name is in flight; the running map is the single source of truth for
//! that and is only touched under the manager lock, which is never held
//! while a worker runs.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{watch, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pulse_core::defaults::WORKER_SHUTDOWN_TIMEOUT_SECS;
use pulse_core::{Error, Result};

use crate::status::StatusService;

/// Status message recorded when a run is stopped on request.
pub const STOPPED_BY_USER: &str = "Stopped by user";

/// Status message recorded for runs cancelled by [`WorkerManager::stop`].
pub const STOPPED_BY_SHUTDOWN: &str = "Stopped: worker manager shutting down";

/// A named unit of background work.
///
/// `run` must check `cancel` at loop heads and return promptly once it
/// fires. Errors returned from `run` become the worker's failed status.
#[async_trait]
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, cancel: CancellationToken) -> Result<()>;
}

struct RunHandle {
    token: CancellationToken,
    done: watch::Receiver<bool>,
}

#[derive(Debug, Clone)]
struct ScheduleEntry {
    worker: String,
    cron: String,
}

#[derive(Default)]
struct ManagerState {
    workers: HashMap<String, Arc<dyn Worker>>,
    running: HashMap<String, RunHandle>,
    schedules: Vec<ScheduleEntry>,
    is_running: bool,
    scheduler: Option<JobScheduler>,
}

struct ManagerInner {
    status: Arc<StatusService>,
    shutdown_timeout: Duration,
    state: RwLock<ManagerState>,
}

/// Supervises the registered workers.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct WorkerManager {
    inner: Arc<ManagerInner>,
}

impl WorkerManager {
    pub fn new(status: Arc<StatusService>) -> Self {
        Self::with_shutdown_timeout(status, Duration::from_secs(WORKER_SHUTDOWN_TIMEOUT_SECS))
    }

    pub fn with_shutdown_timeout(status: Arc<StatusService>, shutdown_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                status,
                shutdown_timeout,
                state: RwLock::new(ManagerState::default()),
            }),
        }
    }

    /// The status service runs are reported to.
    pub fn status(&self) -> &Arc<StatusService> {
        &self.inner.status
    }

    /// Add a worker. A worker registered under an existing name replaces it.
    pub async fn register_worker(&self, worker: Arc<dyn Worker>) {
        let name = worker.name().to_string();
        self.inner
            .state
            .write()
            .await
            .workers
            .insert(name.clone(), worker);
        self.inner.status.register_worker(&name).await;
        info!(subsystem = "jobs", component = "manager", worker = %name, "Worker registered");
    }

    /// Run `name` on a six-field (seconds-resolution) cron schedule.
    ///
    /// An unknown worker name is logged and ignored. When the manager is
    /// already started the schedule takes effect immediately; otherwise it is
    /// applied on the next [`start`](Self::start).
    pub async fn schedule_worker(&self, name: &str, cron: &str) -> Result<()> {
        let mut state = self.inner.state.write().await;
        if !state.workers.contains_key(name) {
            warn!(
                subsystem = "jobs",
                component = "manager",
                worker = name,
                "Cannot schedule unknown worker"
            );
            return Ok(());
        }

        let job = self.cron_job(name, cron)?;
        if let Some(scheduler) = state.scheduler.as_ref() {
            scheduler
                .add(job)
                .await
                .map_err(|e| Error::Job(format!("Failed to add schedule for {}: {:?}", name, e)))?;
        }
        state.schedules.push(ScheduleEntry {
            worker: name.to_string(),
            cron: cron.to_string(),
        });

        info!(
            subsystem = "jobs",
            component = "manager",
            worker = name,
            cron,
            "Worker scheduled"
        );
        Ok(())
    }

    /// Start a run of `name` in the background and return immediately.
    pub async fn run_worker_now(&self, name: &str) -> Result<()> {
        self.spawn_run(name, false).await.map(|_| ())
    }

    /// Register the run handle and spawn the run. A scheduled tick that
    /// lands after [`stop`](Self::stop) flipped the flag starts nothing and
    /// returns `Ok(false)`.
    async fn spawn_run(&self, name: &str, scheduled: bool) -> Result<bool> {
        let mut state = self.inner.state.write().await;
        if scheduled && !state.is_running {
            return Ok(false);
        }
        let worker = state
            .workers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("worker {}", name)))?;
        if state.running.contains_key(name) {
            return Err(Error::AlreadyRunning(name.to_string()));
        }

        let token = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        state.running.insert(
            name.to_string(),
            RunHandle {
                token: token.clone(),
                done: done_rx,
            },
        );
        self.inner.status.start_worker(name).await;
        drop(state);

        let manager = self.clone();
        tokio::spawn(async move {
            manager.execute(worker, token, done_tx).await;
        });
        Ok(true)
    }

    /// Cancel the in-flight run of `name` and wait for it to wind down.
    pub async fn stop_worker(&self, name: &str) -> Result<()> {
        let mut done = {
            let state = self.inner.state.read().await;
            let handle = state
                .running
                .get(name)
                .ok_or_else(|| Error::NotRunning(name.to_string()))?;
            handle.token.cancel();
            self.inner.status.set_error(name, STOPPED_BY_USER).await;
            handle.done.clone()
        };

        info!(subsystem = "jobs", component = "manager", worker = name, "Stop requested");

        if tokio::time::timeout(self.inner.shutdown_timeout, done.wait_for(|d| *d))
            .await
            .is_err()
        {
            warn!(
                subsystem = "jobs",
                component = "manager",
                worker = name,
                timeout_secs = self.inner.shutdown_timeout.as_secs(),
                "Worker did not stop within timeout"
            );
        }
        Ok(())
    }

    /// Start the cron scheduler with every recorded schedule. Idempotent.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.inner.state.write().await;
        if state.is_running {
            return Ok(());
        }

        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| Error::Job(format!("Failed to create scheduler: {:?}", e)))?;
        for entry in &state.schedules {
            let job = self.cron_job(&entry.worker, &entry.cron)?;
            scheduler.add(job).await.map_err(|e| {
                Error::Job(format!("Failed to add schedule for {}: {:?}", entry.worker, e))
            })?;
        }
        scheduler
            .start()
            .await
            .map_err(|e| Error::Job(format!("Failed to start scheduler: {:?}", e)))?;

        state.scheduler = Some(scheduler);
        state.is_running = true;
        info!(
            subsystem = "jobs",
            component = "manager",
            schedules = state.schedules.len(),
            "Worker manager started"
        );
        Ok(())
    }

    /// Cancel every in-flight run and shut the scheduler down. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        let start = Instant::now();
        let (scheduler, pending) = {
            let mut state = self.inner.state.write().await;
            if !state.is_running && state.running.is_empty() {
                return Ok(());
            }
            state.is_running = false;

            let mut pending = Vec::with_capacity(state.running.len());
            for (name, handle) in &state.running {
                handle.token.cancel();
                self.inner.status.set_error(name, STOPPED_BY_SHUTDOWN).await;
                pending.push(handle.done.clone());
            }
            (state.scheduler.take(), pending)
        };

        let timeout = self.inner.shutdown_timeout;
        if let Some(mut scheduler) = scheduler {
            match tokio::time::timeout(timeout, scheduler.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    subsystem = "jobs",
                    component = "manager",
                    error = ?e,
                    "Scheduler shutdown reported an error"
                ),
                Err(_) => warn!(
                    subsystem = "jobs",
                    component = "manager",
                    timeout_secs = timeout.as_secs(),
                    "Scheduler shutdown timed out"
                ),
            }
        }

        let waits = pending.into_iter().map(|mut done| async move {
            let _ = done.wait_for(|d| *d).await;
        });
        if tokio::time::timeout(timeout, join_all(waits)).await.is_err() {
            warn!(
                subsystem = "jobs",
                component = "manager",
                timeout_secs = timeout.as_secs(),
                "In-flight runs did not finish within timeout"
            );
        }

        info!(
            subsystem = "jobs",
            component = "manager",
            duration_ms = start.elapsed().as_millis() as u64,
            "Worker manager stopped"
        );
        Ok(())
    }

    pub async fn running_workers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.state.read().await.running.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered worker names, sorted.
    pub async fn registered_workers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.state.read().await.workers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether the cron scheduler is live.
    pub async fn is_running(&self) -> bool {
        self.inner.state.read().await.is_running
    }

    pub async fn is_worker_running(&self, name: &str) -> bool {
        self.inner.state.read().await.running.contains_key(name)
    }

    /// Build a cron job that triggers `name`. Fails on an invalid expression.
    fn cron_job(&self, name: &str, cron: &str) -> Result<Job> {
        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let worker = name.to_string();
        Job::new_async(cron, move |_id, _scheduler| {
            let weak = weak.clone();
            let worker = worker.clone();
            Box::pin(async move {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                WorkerManager { inner }.trigger_scheduled(&worker).await;
            })
        })
        .map_err(|e| Error::Config(format!("Invalid cron expression '{}': {:?}", cron, e)))
    }

    async fn trigger_scheduled(&self, name: &str) {
        match self.spawn_run(name, true).await {
            Ok(true) => debug!(
                subsystem = "jobs",
                component = "manager",
                worker = name,
                "Scheduled run started"
            ),
            Ok(false) => debug!(
                subsystem = "jobs",
                component = "manager",
                worker = name,
                "Manager stopped, skipping tick"
            ),
            Err(Error::AlreadyRunning(_)) => debug!(
                subsystem = "jobs",
                component = "manager",
                worker = name,
                "Previous run still in flight, skipping tick"
            ),
            Err(e) => warn!(
                subsystem = "jobs",
                component = "manager",
                worker = name,
                error = %e,
                "Scheduled run could not start"
            ),
        }
    }

    async fn execute(
        &self,
        worker: Arc<dyn Worker>,
        token: CancellationToken,
        done: watch::Sender<bool>,
    ) {
        let name = worker.name().to_string();
        let start = Instant::now();
        info!(subsystem = "jobs", component = "manager", worker = %name, "Worker run started");

        let run_token = token.clone();
        let outcome = match tokio::spawn(async move { worker.run(run_token).await }).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(Error::Job(format!("Worker panicked: {}", panic_message(e)))),
            Err(e) => Err(Error::Job(format!("Worker task aborted: {}", e))),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let mut state = self.inner.state.write().await;
        if token.is_cancelled() {
            info!(
                subsystem = "jobs",
                component = "manager",
                worker = %name,
                duration_ms,
                "Worker run cancelled"
            );
        } else {
            match outcome {
                Ok(()) => {
                    self.inner
                        .status
                        .complete_worker(&name, "Completed successfully")
                        .await;
                    info!(
                        subsystem = "jobs",
                        component = "manager",
                        worker = %name,
                        duration_ms,
                        "Worker run completed"
                    );
                }
                Err(e) => {
                    self.inner.status.set_error(&name, &e.to_string()).await;
                    error!(
                        subsystem = "jobs",
                        component = "manager",
                        worker = %name,
                        duration_ms,
                        error = %e,
                        "Worker run failed"
                    );
                }
            }
        }
        state.running.remove(&name);
        drop(state);
        let _ = done.send(true);
    }
}

fn panic_message(e: tokio::task::JoinError) -> String {
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pulse_core::WorkerState;

    struct CountingWorker {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Worker for CountingWorker {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run(&self, _cancel: CancellationToken) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct PanickingWorker;

    #[async_trait]
    impl Worker for PanickingWorker {
        fn name(&self) -> &str {
            "panicky"
        }

        async fn run(&self, _cancel: CancellationToken) -> Result<()> {
            panic!("exploded");
        }
    }

    fn manager() -> WorkerManager {
        WorkerManager::with_shutdown_timeout(
            Arc::new(StatusService::new()),
            Duration::from_secs(5),
        )
    }

    async fn wait_idle(manager: &WorkerManager, name: &str) {
        for _ in 0..200 {
            if !manager.is_worker_running(name).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("worker {name} never finished");
    }

    #[tokio::test]
    async fn test_run_unknown_worker_is_not_found() {
        let err = manager().run_worker_now("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_stop_idle_worker_is_not_running() {
        let m = manager();
        m.register_worker(Arc::new(CountingWorker {
            runs: AtomicUsize::new(0),
        }))
        .await;
        let err = m.stop_worker("counting").await.unwrap_err();
        assert!(matches!(err, Error::NotRunning(_)));
    }

    #[tokio::test]
    async fn test_successful_run_completes_status() {
        let m = manager();
        let worker = Arc::new(CountingWorker {
            runs: AtomicUsize::new(0),
        });
        m.register_worker(worker.clone()).await;

        m.run_worker_now("counting").await.unwrap();
        wait_idle(&m, "counting").await;

        assert_eq!(worker.runs.load(Ordering::SeqCst), 1);
        let status = m.status().get_status("counting").await.unwrap();
        assert_eq!(status.state, WorkerState::Completed);
        assert_eq!(status.message, "Completed successfully");
        assert_eq!(status.progress, 100);
    }

    #[tokio::test]
    async fn test_panic_is_recorded_as_failure() {
        let m = manager();
        m.register_worker(Arc::new(PanickingWorker)).await;

        m.run_worker_now("panicky").await.unwrap();
        wait_idle(&m, "panicky").await;

        let status = m.status().get_status("panicky").await.unwrap();
        assert_eq!(status.state, WorkerState::Failed);
        assert!(status.error.unwrap().contains("exploded"));
    }

    #[tokio::test]
    async fn test_invalid_cron_is_config_error() {
        let m = manager();
        m.register_worker(Arc::new(PanickingWorker)).await;
        let err = m.schedule_worker("panicky", "not a cron").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_schedule_unknown_worker_is_noop() {
        let m = manager();
        m.schedule_worker("ghost", "0 * * * * *").await.unwrap();
    }

    #[tokio::test]
    async fn test_registered_workers_sorted() {
        let m = manager();
        m.register_worker(Arc::new(PanickingWorker)).await;
        m.register_worker(Arc::new(CountingWorker {
            runs: AtomicUsize::new(0),
        }))
        .await;
        assert_eq!(m.registered_workers().await, vec!["counting", "panicky"]);
    }

    #[tokio::test]
    async fn test_scheduled_tick_only_runs_while_started() {
        let m = manager();
        let worker = Arc::new(CountingWorker {
            runs: AtomicUsize::new(0),
        });
        m.register_worker(worker.clone()).await;

        m.trigger_scheduled("counting").await;
        assert!(!m.is_worker_running("counting").await);
        assert_eq!(worker.runs.load(Ordering::SeqCst), 0);

        m.start().await.unwrap();
        m.trigger_scheduled("counting").await;
        wait_idle(&m, "counting").await;
        assert_eq!(worker.runs.load(Ordering::SeqCst), 1);

        m.stop().await.unwrap();
        m.trigger_scheduled("counting").await;
        assert!(!m.is_worker_running("counting").await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.runs.load(Ordering::SeqCst), 1);
        let status = m.status().get_status("counting").await.unwrap();
        assert_eq!(status.state, WorkerState::Completed);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let m = manager();
        m.stop().await.unwrap();
        assert!(!m.is_running().await);
    }
}
