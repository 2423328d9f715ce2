//! Exa web search client.

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use pulse_core::{
    Error, FindSimilarOptions, Result, SearchOptions, SearchResult, SimilaritySearch,
};

use super::types::*;

/// Default Exa API endpoint.
pub const DEFAULT_EXA_URL: &str = "https://api.exa.ai";

/// Default request timeout in seconds.
pub const DEFAULT_EXA_TIMEOUT_SECS: u64 = 30;

/// Configuration for the Exa client.
#[derive(Debug, Clone)]
pub struct ExaConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl ExaConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_EXA_URL.to_string(),
            timeout_seconds: DEFAULT_EXA_TIMEOUT_SECS,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Returns `None` when `EXA_API_KEY` is unset or empty, which disables
    /// discovery and the search-first crawl strategy.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `EXA_API_KEY` | (none) |
    /// | `EXA_BASE_URL` | `https://api.exa.ai` |
    /// | `EXA_TIMEOUT` | `30` |
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("EXA_API_KEY").ok().filter(|k| !k.is_empty())?;
        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("EXA_BASE_URL") {
            config.base_url = url;
        }
        if let Some(secs) = std::env::var("EXA_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.timeout_seconds = secs;
        }
        Some(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// HTTP client for the Exa search API.
pub struct ExaClient {
    client: Client,
    config: ExaConfig,
}

impl ExaClient {
    pub fn new(config: ExaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "exa",
            url = %config.base_url,
            "Initializing Exa client"
        );
        Ok(Self { client, config })
    }

    /// Build a client from the environment, or `None` when no API key is set.
    pub fn from_env() -> Result<Option<Self>> {
        ExaConfig::from_env().map(Self::new).transpose()
    }

    async fn post<T: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<Vec<SearchResult>> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Search(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ExaErrorResponse>()
                .await
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(Error::Search(format!("Exa returned {}: {}", status, detail)));
        }

        let parsed: ExaResponse = response
            .json()
            .await
            .map_err(|e| Error::Search(format!("Failed to parse response: {}", e)))?;

        Ok(parsed
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .map(SearchResult::from)
            .collect())
    }
}

#[async_trait]
impl SimilaritySearch for ExaClient {
    async fn find_similar(
        &self,
        url: &str,
        options: FindSimilarOptions,
    ) -> Result<Vec<SearchResult>> {
        let start = Instant::now();
        let request = ExaFindSimilarRequest {
            url: url.to_string(),
            num_results: options.num_results,
            exclude_source_domain: options.exclude_source_domain,
            contents: ContentsOptions {
                text: options.include_text,
                summary: None,
            },
        };
        let results = self.post("/findSimilar", &request).await?;

        debug!(
            subsystem = "inference",
            component = "exa",
            op = "find_similar",
            url = %url,
            result_count = results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Similar pages found"
        );
        Ok(results)
    }

    async fn search(&self, query: &str, options: SearchOptions) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("search query cannot be empty".to_string()));
        }

        let start = Instant::now();
        let request = ExaSearchRequest {
            query: query.to_string(),
            search_type: "auto".to_string(),
            num_results: options.num_results,
            include_domains: options.include_domains,
            start_published_date: options.start_published_date.map(|d| d.to_rfc3339()),
            contents: ContentsOptions {
                text: options.include_text,
                summary: options.include_summary.then_some(SummaryOptions {}),
            },
        };
        let results = self.post("/search", &request).await?;

        debug!(
            subsystem = "inference",
            component = "exa",
            op = "search",
            result_count = results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Search complete"
        );
        Ok(results)
    }
}
