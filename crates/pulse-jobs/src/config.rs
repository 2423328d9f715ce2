//! Worker scheduling configuration.

use pulse_core::defaults::{
    CRAWL_SCHEDULE, DISCOVERY_SCHEDULE, INSIGHT_SCHEDULE, WORKER_SHUTDOWN_TIMEOUT_SECS,
};

/// Cron schedules and shutdown behavior for the background workers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Six-field cron expression for the crawl worker.
    pub crawl_schedule: String,
    /// Six-field cron expression for the discovery worker.
    pub discovery_schedule: String,
    /// Six-field cron expression for the insight worker.
    pub insight_schedule: String,
    /// Whether workers are registered and scheduled at all.
    pub enabled: bool,
    /// Seconds to wait for the scheduler and in-flight runs on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            crawl_schedule: CRAWL_SCHEDULE.to_string(),
            discovery_schedule: DISCOVERY_SCHEDULE.to_string(),
            insight_schedule: INSIGHT_SCHEDULE.to_string(),
            enabled: true,
            shutdown_timeout_secs: WORKER_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CRAWL_SCHEDULE` | `0 */15 * * * *` | Crawl worker cron |
    /// | `DISCOVERY_SCHEDULE` | `0 0 */6 * * *` | Discovery worker cron |
    /// | `INSIGHT_SCHEDULE` | `0 0 * * * *` | Insight worker cron |
    /// | `WORKERS_ENABLED` | `true` | Enable/disable background workers |
    /// | `WORKER_SHUTDOWN_TIMEOUT_SECS` | `30` | Graceful shutdown bound |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let enabled = std::env::var("WORKERS_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let schedule = |key: &str, fallback: String| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
        };

        let shutdown_timeout_secs = std::env::var("WORKER_SHUTDOWN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(WORKER_SHUTDOWN_TIMEOUT_SECS);

        Self {
            crawl_schedule: schedule("CRAWL_SCHEDULE", defaults.crawl_schedule),
            discovery_schedule: schedule("DISCOVERY_SCHEDULE", defaults.discovery_schedule),
            insight_schedule: schedule("INSIGHT_SCHEDULE", defaults.insight_schedule),
            enabled,
            shutdown_timeout_secs,
        }
    }

    pub fn with_crawl_schedule(mut self, cron: impl Into<String>) -> Self {
        self.crawl_schedule = cron.into();
        self
    }

    pub fn with_discovery_schedule(mut self, cron: impl Into<String>) -> Self {
        self.discovery_schedule = cron.into();
        self
    }

    pub fn with_insight_schedule(mut self, cron: impl Into<String>) -> Self {
        self.insight_schedule = cron.into();
        self
    }

    /// Enable or disable the background workers.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_shutdown_timeout(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }
}
