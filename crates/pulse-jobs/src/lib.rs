//! # pulse-jobs
//!
//! Background worker supervisor and the crawl / discovery / insight
//! pipeline for pulse.
//!
//! This crate provides:
//! - A [`WorkerManager`] that runs named workers on cron schedules or on
//!   demand, at most one run per name, with cooperative cancellation
//! - A [`StatusService`] holding live per-worker status with
//!   non-blocking subscriber fan-out
//! - The [`CrawlWorker`], [`DiscoveryWorker`], and [`InsightWorker`]
//! - The [`DataSourceService`] and [`InsightService`] domain services
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pulse_jobs::{CrawlWorker, StatusService, WorkerConfig, WorkerManager};
//!
//! let db = pulse_db::Database::connect("postgres://...").await?;
//! let status = Arc::new(StatusService::new());
//! let config = WorkerConfig::from_env();
//! let manager = WorkerManager::with_shutdown_timeout(
//!     status.clone(),
//!     Duration::from_secs(config.shutdown_timeout_secs),
//! );
//!
//! let crawl = CrawlWorker::from_database(&db, embedder, status.clone())?;
//! manager.register_worker(Arc::new(crawl)).await;
//! manager.schedule_worker("crawl", &config.crawl_schedule).await?;
//! manager.start().await?;
//!
//! // ... later
//! manager.stop().await?;
//! ```

pub mod config;
pub mod crawl;
pub mod discovery;
pub mod extract;
pub mod insight;
pub mod manager;
pub mod services;
pub mod status;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use pulse_core::*;

pub use config::WorkerConfig;
pub use crawl::{CrawlWorker, CRAWL_WORKER_NAME};
pub use discovery::{DiscoveryWorker, DISCOVERY_WORKER_NAME};
pub use insight::{InsightWorker, INSIGHT_WORKER_NAME};
pub use manager::{Worker, WorkerManager};
pub use services::{DataSourceService, InsightService};
pub use status::{StatusService, StatusSubscription};
