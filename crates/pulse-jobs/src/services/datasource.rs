//! Data source management.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use pulse_core::{
    CrawlFrequency, CrawlStatus, CrawledContent, CrawledContentRepository,
    CreateDataSourceRequest, DataSource, DataSourceRepository, Error, Page, Result, SourceType,
    UpdateDataSourceRequest,
};
use pulse_db::Database;

use super::clamp_page;

/// Owns the data source lifecycle: creation, updates, crawl bookkeeping,
/// and discovered-source creation.
#[derive(Clone)]
pub struct DataSourceService {
    sources: Arc<dyn DataSourceRepository>,
    content: Arc<dyn CrawledContentRepository>,
}

impl DataSourceService {
    pub fn new(
        sources: Arc<dyn DataSourceRepository>,
        content: Arc<dyn CrawledContentRepository>,
    ) -> Self {
        Self { sources, content }
    }

    pub fn from_database(db: &Database) -> Self {
        Self::new(db.data_sources.clone(), db.content.clone())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<DataSource> {
        self.sources
            .find_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("data source {}", id)))
    }

    pub async fn list_by_organization(&self, organization_id: Uuid) -> Result<Vec<DataSource>> {
        self.sources.find_by_organization(organization_id).await
    }

    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<DataSource>> {
        self.sources.find_by_user(user_id).await
    }

    pub async fn list_all(&self, page: i64, limit: i64) -> Result<Page<DataSource>> {
        let (page, limit) = clamp_page(page, limit);
        let (items, total) = self.sources.list((page - 1) * limit, limit).await?;
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    /// Create a source owned by an organization, a user, or both.
    pub async fn create(
        &self,
        organization_id: Option<Uuid>,
        user_id: Option<Uuid>,
        req: CreateDataSourceRequest,
    ) -> Result<DataSource> {
        if organization_id.is_none() && user_id.is_none() {
            return Err(Error::InvalidInput(
                "either organization_id or user_id must be provided".to_string(),
            ));
        }
        let url = req.url.trim().to_string();
        if url.is_empty() {
            return Err(Error::InvalidInput("url cannot be empty".to_string()));
        }
        if self.sources.find_by_url(&url).await?.is_some() {
            return Err(Error::AlreadyExists(format!("data source with url {}", url)));
        }

        let now = Utc::now();
        let crawl_frequency = req.crawl_frequency.unwrap_or_default();
        let source = DataSource {
            id: pulse_core::new_v7(),
            organization_id,
            user_id,
            name: req.name.trim().to_string(),
            url,
            feed_url: req.feed_url.filter(|f| !f.trim().is_empty()),
            source_type: req.source_type.unwrap_or_default(),
            crawl_frequency,
            is_enabled: req.is_enabled.unwrap_or(true),
            is_discovered: false,
            discovered_from_id: None,
            last_crawled_at: None,
            next_crawl_at: Some(crawl_frequency.next_crawl_at(now)),
            crawl_status: CrawlStatus::Pending,
            error_message: None,
            content_count: 0,
            subscriber_count: 1,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        self.sources.save(&source).await?;

        info!(
            subsystem = "jobs",
            component = "datasource",
            op = "create",
            source_id = %source.id,
            url = %source.url,
            source_type = %source.source_type,
            "Data source created"
        );
        Ok(source)
    }

    /// Apply a partial update. A url change is checked for conflicts and a
    /// frequency change reschedules the next crawl.
    pub async fn update(&self, id: Uuid, req: UpdateDataSourceRequest) -> Result<DataSource> {
        let mut source = self.get_by_id(id).await?;

        if let Some(name) = req.name {
            source.name = name.trim().to_string();
        }
        if let Some(url) = req.url.map(|u| u.trim().to_string()) {
            if url != source.url {
                if self.sources.find_by_url(&url).await?.is_some() {
                    return Err(Error::AlreadyExists(format!("data source with url {}", url)));
                }
                source.url = url;
            }
        }
        if let Some(feed_url) = req.feed_url {
            source.feed_url = Some(feed_url).filter(|f| !f.trim().is_empty());
        }
        if let Some(source_type) = req.source_type {
            source.source_type = source_type;
        }
        if let Some(frequency) = req.crawl_frequency {
            if frequency != source.crawl_frequency {
                source.crawl_frequency = frequency;
                source.next_crawl_at = Some(frequency.next_crawl_at(Utc::now()));
            }
        }
        if let Some(enabled) = req.is_enabled {
            source.is_enabled = enabled;
        }
        source.updated_at = Utc::now();

        self.sources.update(&source).await?;
        debug!(
            subsystem = "jobs",
            component = "datasource",
            op = "update",
            source_id = %id,
            "Data source updated"
        );
        Ok(source)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.sources.delete(id).await? {
            return Err(Error::NotFound(format!("data source {}", id)));
        }
        info!(
            subsystem = "jobs",
            component = "datasource",
            op = "delete",
            source_id = %id,
            "Data source deleted"
        );
        Ok(())
    }

    /// Make the source due on the next crawl run.
    pub async fn trigger_crawl(&self, id: Uuid) -> Result<()> {
        self.get_by_id(id).await?;
        self.sources
            .update_crawl_status(id, CrawlStatus::Pending, None)
            .await?;
        self.sources.update_next_crawl_at(id, Utc::now()).await
    }

    pub async fn get_content(
        &self,
        id: Uuid,
        page: i64,
        limit: i64,
    ) -> Result<Page<CrawledContent>> {
        let (page, limit) = clamp_page(page, limit);
        let (items, total) = self
            .content
            .find_by_data_source(id, (page - 1) * limit, limit)
            .await?;
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn get_due_to_crawl(&self, limit: i64) -> Result<Vec<DataSource>> {
        self.sources.find_due_to_crawl(limit).await
    }

    pub async fn update_crawl_status(
        &self,
        id: Uuid,
        status: CrawlStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.sources
            .update_crawl_status(id, status, error_message)
            .await
    }

    /// Schedule the next crawl one frequency interval from now.
    pub async fn set_next_crawl_time(&self, id: Uuid, frequency: CrawlFrequency) -> Result<()> {
        self.sources
            .update_next_crawl_at(id, frequency.next_crawl_at(Utc::now()))
            .await
    }

    pub async fn increment_content_count(&self, id: Uuid, delta: i32) -> Result<()> {
        self.sources.increment_content_count(id, delta).await
    }

    /// Record a site found by similarity search. Discovered sources start
    /// disabled until someone opts in.
    pub async fn create_discovered_source(
        &self,
        organization_id: Option<Uuid>,
        user_id: Option<Uuid>,
        discovered_from_id: Uuid,
        name: &str,
        url: &str,
    ) -> Result<DataSource> {
        if self.sources.find_by_url(url).await?.is_some() {
            return Err(Error::AlreadyExists(format!("data source with url {}", url)));
        }

        let now = Utc::now();
        let frequency = CrawlFrequency::Daily;
        let source = DataSource {
            id: pulse_core::new_v7(),
            organization_id,
            user_id,
            name: name.to_string(),
            url: url.to_string(),
            feed_url: None,
            source_type: SourceType::Blog,
            crawl_frequency: frequency,
            is_enabled: false,
            is_discovered: true,
            discovered_from_id: Some(discovered_from_id),
            last_crawled_at: None,
            next_crawl_at: Some(frequency.next_crawl_at(now)),
            crawl_status: CrawlStatus::Pending,
            error_message: None,
            content_count: 0,
            subscriber_count: 1,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        self.sources.save(&source).await?;
        Ok(source)
    }
}
