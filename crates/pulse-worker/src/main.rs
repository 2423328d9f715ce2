//! pulse background worker process.
//!
//! Connects to PostgreSQL, registers the crawl, discovery, and insight
//! workers on their cron schedules, and runs until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulse_core::{EmbeddingBackend, GenerationBackend, SimilaritySearch};
use pulse_db::{log_pool_metrics, Database, PoolConfig};
use pulse_inference::{ExaClient, OpenAIBackend};
use pulse_jobs::{
    CrawlWorker, DataSourceService, DiscoveryWorker, InsightService, InsightWorker,
    StatusService, WorkerConfig, WorkerManager, CRAWL_WORKER_NAME, DISCOVERY_WORKER_NAME,
    INSIGHT_WORKER_NAME,
};

/// How often pool occupancy is logged while the process runs.
const POOL_CHECK_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "pulse_worker=info,pulse_jobs=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pulse_worker=info,pulse_jobs=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("pulse-worker.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/pulse".to_string());
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env())
        .await
        .context("connecting to database")?;
    db.migrate().await.context("running migrations")?;
    info!(subsystem = "worker", "Database ready");

    let openai = Arc::new(OpenAIBackend::from_env().context("configuring inference backend")?);
    let embedder: Arc<dyn EmbeddingBackend> = openai.clone();
    let generator: Option<Arc<dyn GenerationBackend>> = if openai.config().generation_available() {
        Some(openai as Arc<dyn GenerationBackend>)
    } else {
        info!(
            subsystem = "worker",
            "OPENAI_API_KEY not set for the hosted endpoint, insight generation disabled"
        );
        None
    };

    let search: Option<Arc<dyn SimilaritySearch>> = match ExaClient::from_env() {
        Ok(Some(client)) => Some(Arc::new(client)),
        Ok(None) => {
            info!(
                subsystem = "worker",
                "EXA_API_KEY not set, search-first crawling and discovery disabled"
            );
            None
        }
        Err(e) => {
            warn!(subsystem = "worker", error = %e, "Failed to configure search provider");
            None
        }
    };

    let config = WorkerConfig::from_env();
    let status = Arc::new(StatusService::new());
    let manager = WorkerManager::with_shutdown_timeout(
        status.clone(),
        Duration::from_secs(config.shutdown_timeout_secs),
    );

    if config.enabled {
        let mut crawl = CrawlWorker::from_database(&db, embedder.clone(), status.clone())?;
        if let Some(search) = search.clone() {
            crawl = crawl.with_search(search);
        }
        let discovery =
            DiscoveryWorker::new(DataSourceService::from_database(&db), search, status.clone());
        let insight = InsightWorker::from_database(
            &db,
            InsightService::from_database(&db, embedder),
            generator,
            status.clone(),
        );

        manager.register_worker(Arc::new(crawl)).await;
        manager.register_worker(Arc::new(discovery)).await;
        manager.register_worker(Arc::new(insight)).await;

        manager
            .schedule_worker(CRAWL_WORKER_NAME, &config.crawl_schedule)
            .await?;
        manager
            .schedule_worker(DISCOVERY_WORKER_NAME, &config.discovery_schedule)
            .await?;
        manager
            .schedule_worker(INSIGHT_WORKER_NAME, &config.insight_schedule)
            .await?;

        info!(
            subsystem = "worker",
            crawl = %config.crawl_schedule,
            discovery = %config.discovery_schedule,
            insight = %config.insight_schedule,
            "Workers scheduled"
        );
    } else {
        info!(subsystem = "worker", "Background workers disabled (WORKERS_ENABLED=false)");
    }

    manager.start().await?;

    let mut pool_check = tokio::time::interval(Duration::from_secs(POOL_CHECK_INTERVAL_SECS));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal.context("waiting for shutdown signal")?;
                break;
            }
            _ = pool_check.tick() => {
                log_pool_metrics(db.pool());
            }
        }
    }
    info!(subsystem = "worker", "Shutdown signal received");

    manager.stop().await?;
    info!(subsystem = "worker", "Worker process stopped");
    Ok(())
}
