//! Live worker status tracking with subscriber fan-out.
//!
//! [`StatusService`] owns one [`WorkerStatus`] per worker name. Every
//! mutation broadcasts the post-mutation snapshot to all subscribers with a
//! non-blocking `try_send`: a subscriber whose queue is full misses that
//! update, and a subscriber whose receiver was dropped is pruned.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};
use uuid::Uuid;

use pulse_core::defaults::STATUS_SUBSCRIBER_CAPACITY;
use pulse_core::{StatusUpdate, WorkerState, WorkerStatus};

/// Receiving end of a status subscription.
pub struct StatusSubscription {
    pub id: Uuid,
    pub receiver: mpsc::Receiver<StatusUpdate>,
}

impl StatusSubscription {
    /// Wait for the next update. Returns `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<StatusUpdate> {
        self.receiver.recv().await
    }
}

#[derive(Default)]
struct StatusState {
    statuses: HashMap<String, WorkerStatus>,
    subscribers: HashMap<Uuid, mpsc::Sender<StatusUpdate>>,
}

/// Tracks worker status and fans updates out to subscribers.
///
/// Constructed once and shared behind an `Arc`.
#[derive(Default)]
pub struct StatusService {
    state: RwLock<StatusState>,
}

impl StatusService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an idle entry for `name` if none exists.
    pub async fn register_worker(&self, name: &str) {
        let mut state = self.state.write().await;
        if state.statuses.contains_key(name) {
            return;
        }
        state
            .statuses
            .insert(name.to_string(), WorkerStatus::idle(name));
        debug!(
            subsystem = "jobs",
            component = "status",
            worker = name,
            "Worker registered"
        );
        Self::broadcast(&mut state, name);
    }

    /// Mark a run as started, resetting progress and counters.
    pub async fn start_worker(&self, name: &str) {
        self.mutate(name, |s| {
            s.state = WorkerState::Running;
            s.progress = 0;
            s.message = "Starting...".to_string();
            s.error = None;
            s.items_done = 0;
            s.items_total = 0;
            s.started_at = Some(Utc::now());
            s.completed_at = None;
        })
        .await;
    }

    /// Set state, progress, and message directly.
    pub async fn update_status(&self, name: &str, state: WorkerState, progress: u8, message: &str) {
        self.mutate(name, |s| {
            s.state = state;
            s.progress = progress.min(100);
            s.message = message.to_string();
            match state {
                WorkerState::Running if s.started_at.is_none() => {
                    s.started_at = Some(Utc::now());
                }
                WorkerState::Completed | WorkerState::Failed => {
                    s.completed_at = Some(Utc::now());
                }
                _ => {}
            }
        })
        .await;
    }

    /// Record item counts. Percent progress is recomputed only when `total > 0`.
    pub async fn set_progress(&self, name: &str, done: u64, total: u64, message: &str) {
        self.mutate(name, |s| {
            s.items_done = done;
            s.items_total = total;
            s.message = message.to_string();
            if total > 0 {
                s.progress = (done.min(total) * 100 / total) as u8;
            }
        })
        .await;
    }

    /// Record a failure as the terminal status.
    pub async fn set_error(&self, name: &str, error: &str) {
        self.mutate(name, |s| {
            s.state = WorkerState::Failed;
            s.error = Some(error.to_string());
            s.completed_at = Some(Utc::now());
        })
        .await;
    }

    pub async fn complete_worker(&self, name: &str, message: &str) {
        self.mutate(name, |s| {
            s.state = WorkerState::Completed;
            s.progress = 100;
            s.message = message.to_string();
            s.completed_at = Some(Utc::now());
        })
        .await;
    }

    /// Back to idle with counters cleared. Timestamps are kept.
    pub async fn reset_worker(&self, name: &str) {
        self.mutate(name, |s| {
            s.state = WorkerState::Idle;
            s.progress = 0;
            s.message = String::new();
            s.error = None;
            s.items_done = 0;
            s.items_total = 0;
        })
        .await;
    }

    pub async fn get_status(&self, name: &str) -> Option<WorkerStatus> {
        self.state.read().await.statuses.get(name).cloned()
    }

    pub async fn get_all_statuses(&self) -> HashMap<String, WorkerStatus> {
        self.state.read().await.statuses.clone()
    }

    /// Open a bounded subscription to every subsequent status change.
    pub async fn subscribe(&self) -> StatusSubscription {
        let (tx, rx) = mpsc::channel(STATUS_SUBSCRIBER_CAPACITY);
        let id = Uuid::new_v4();
        self.state.write().await.subscribers.insert(id, tx);
        debug!(subsystem = "jobs", component = "status", %id, "Subscriber added");
        StatusSubscription { id, receiver: rx }
    }

    /// Drop the subscriber's sender, which closes its channel.
    pub async fn unsubscribe(&self, id: Uuid) {
        if self.state.write().await.subscribers.remove(&id).is_some() {
            debug!(subsystem = "jobs", component = "status", %id, "Subscriber removed");
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.read().await.subscribers.len()
    }

    async fn mutate<F>(&self, name: &str, apply: F)
    where
        F: FnOnce(&mut WorkerStatus),
    {
        let mut state = self.state.write().await;
        let status = state
            .statuses
            .entry(name.to_string())
            .or_insert_with(|| WorkerStatus::idle(name));
        apply(status);
        Self::broadcast(&mut state, name);
    }

    fn broadcast(state: &mut StatusState, name: &str) {
        let Some(status) = state.statuses.get(name) else {
            return;
        };
        if state.subscribers.is_empty() {
            return;
        }

        let update = StatusUpdate {
            worker_name: name.to_string(),
            status: status.clone(),
            timestamp: Utc::now(),
        };

        let mut closed = Vec::new();
        for (id, tx) in &state.subscribers {
            match tx.try_send(update.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(subsystem = "jobs", component = "status", %id, "Subscriber full, update dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        for id in closed {
            state.subscribers.remove(&id);
            debug!(subsystem = "jobs", component = "status", %id, "Pruned closed subscriber");
        }
    }
}
