//! Discovery worker: finds sites similar to the user-added sources and
//! records them as disabled, discovered sources.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pulse_core::defaults::{
    DISCOVERY_LIST_LIMIT, DISCOVERY_MAX_PER_SOURCE, DISCOVERY_MAX_SOURCES,
    DISCOVERY_RESULT_MARGIN,
};
use pulse_core::{DataSource, Error, FindSimilarOptions, Result, SimilaritySearch, WorkerState};

use crate::extract::url_utils::{extract_domain_name, is_same_domain_root, normalize_url};
use crate::manager::Worker;
use crate::services::DataSourceService;
use crate::status::StatusService;

pub const DISCOVERY_WORKER_NAME: &str = "discovery";

pub struct DiscoveryWorker {
    sources: DataSourceService,
    search: Option<Arc<dyn SimilaritySearch>>,
    status: Arc<StatusService>,
    max_per_source: usize,
    max_sources: usize,
}

impl DiscoveryWorker {
    /// Without a search provider every run is a logged no-op.
    pub fn new(
        sources: DataSourceService,
        search: Option<Arc<dyn SimilaritySearch>>,
        status: Arc<StatusService>,
    ) -> Self {
        Self {
            sources,
            search,
            status,
            max_per_source: DISCOVERY_MAX_PER_SOURCE,
            max_sources: DISCOVERY_MAX_SOURCES,
        }
    }

    async fn discover_from(
        &self,
        search: &dyn SimilaritySearch,
        source: &DataSource,
    ) -> Result<usize> {
        let results = search
            .find_similar(
                &source.url,
                FindSimilarOptions {
                    num_results: self.max_per_source + DISCOVERY_RESULT_MARGIN,
                    exclude_source_domain: true,
                    include_text: false,
                },
            )
            .await?;
        if results.is_empty() {
            debug!(
                subsystem = "jobs",
                component = "discovery",
                source_id = %source.id,
                "No similar sites found"
            );
            return Ok(0);
        }

        let mut discovered = 0;
        for result in results {
            if discovered >= self.max_per_source {
                break;
            }
            if result.url.is_empty() || !result.url.starts_with("http") {
                continue;
            }
            let Some(url) = normalize_url(&result.url) else {
                continue;
            };
            if is_same_domain_root(&source.url, &url) {
                continue;
            }

            let name = result
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| extract_domain_name(&url));

            match self
                .sources
                .create_discovered_source(
                    source.organization_id,
                    source.user_id,
                    source.id,
                    &name,
                    &url,
                )
                .await
            {
                Ok(created) => {
                    discovered += 1;
                    info!(
                        subsystem = "jobs",
                        component = "discovery",
                        source_id = %created.id,
                        from_source = %source.id,
                        url = %url,
                        name = %name,
                        "Discovered similar site"
                    );
                }
                Err(e) if e.is_already_exists() => continue,
                Err(e) => warn!(
                    subsystem = "jobs",
                    component = "discovery",
                    url = %url,
                    error = %e,
                    "Failed to create discovered source"
                ),
            }
        }
        Ok(discovered)
    }
}

#[async_trait]
impl Worker for DiscoveryWorker {
    fn name(&self) -> &str {
        DISCOVERY_WORKER_NAME
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let name = DISCOVERY_WORKER_NAME;
        let Some(search) = self.search.as_deref() else {
            warn!(
                subsystem = "jobs",
                component = "discovery",
                "Search provider not configured, skipping discovery"
            );
            self.status
                .update_status(
                    name,
                    WorkerState::Running,
                    100,
                    "Search provider not configured, skipping",
                )
                .await;
            return Ok(());
        };

        self.status
            .update_status(name, WorkerState::Running, 0, "Fetching data sources...")
            .await;
        let page = self.sources.list_all(1, DISCOVERY_LIST_LIMIT).await?;
        let candidates: Vec<DataSource> = page
            .items
            .into_iter()
            .filter(|s| s.is_enabled && !s.is_discovered)
            .take(self.max_sources)
            .collect();

        if candidates.is_empty() {
            info!(
                subsystem = "jobs",
                component = "discovery",
                "No manual sources to discover from"
            );
            self.status
                .update_status(name, WorkerState::Running, 100, "No manual sources to discover from")
                .await;
            return Ok(());
        }

        let total = candidates.len() as u64;
        self.status
            .set_progress(name, 0, total, &format!("Processing {} sources", total))
            .await;

        let mut total_discovered = 0;
        for (i, source) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(name.to_string()));
            }
            self.status
                .set_progress(
                    name,
                    i as u64,
                    total,
                    &format!("Finding similar sites for: {}", source.name),
                )
                .await;

            match self.discover_from(search, source).await {
                Ok(n) => total_discovered += n,
                Err(e) => error!(
                    subsystem = "jobs",
                    component = "discovery",
                    source_id = %source.id,
                    error = %e,
                    "Failed to discover similar sites"
                ),
            }
        }

        info!(
            subsystem = "jobs",
            component = "discovery",
            result_count = total_discovered,
            "Discovery run completed"
        );
        self.status
            .set_progress(
                name,
                total,
                total,
                &format!("Discovered {} new sites", total_discovered),
            )
            .await;
        Ok(())
    }
}
