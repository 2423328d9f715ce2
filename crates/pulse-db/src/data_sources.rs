//! Data source repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use uuid::Uuid;

use pulse_core::{
    CrawlFrequency, CrawlStatus, DataSource, DataSourceRepository, Error, Result, SourceType,
};

use crate::map_unique_violation;

const SOURCE_COLUMNS: &str = "id, organization_id, user_id, name, url, feed_url, source_type, \
     crawl_frequency, is_enabled, is_discovered, discovered_from_id, last_crawled_at, \
     next_crawl_at, crawl_status, error_message, content_count, subscriber_count, metadata, \
     created_at, updated_at";

/// PostgreSQL implementation of DataSourceRepository.
pub struct PgDataSourceRepository {
    pool: Pool<Postgres>,
}

impl PgDataSourceRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(r: &PgRow) -> DataSource {
        let source_type: String = r.get("source_type");
        let crawl_frequency: String = r.get("crawl_frequency");
        let crawl_status: String = r.get("crawl_status");
        DataSource {
            id: r.get("id"),
            organization_id: r.get("organization_id"),
            user_id: r.get("user_id"),
            name: r.get("name"),
            url: r.get("url"),
            feed_url: r.get("feed_url"),
            source_type: SourceType::parse_lenient(&source_type),
            crawl_frequency: CrawlFrequency::parse_lenient(&crawl_frequency),
            is_enabled: r.get("is_enabled"),
            is_discovered: r.get("is_discovered"),
            discovered_from_id: r.get("discovered_from_id"),
            last_crawled_at: r.get("last_crawled_at"),
            next_crawl_at: r.get("next_crawl_at"),
            crawl_status: crawl_status.parse().unwrap_or_default(),
            error_message: r.get("error_message"),
            content_count: r.get("content_count"),
            subscriber_count: r.get("subscriber_count"),
            metadata: r.get("metadata"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }
    }
}

#[async_trait]
impl DataSourceRepository for PgDataSourceRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<DataSource>> {
        let row = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM data_source WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_row))
    }

    async fn find_by_organization(&self, organization_id: Uuid) -> Result<Vec<DataSource>> {
        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM data_source
             WHERE organization_id = $1 ORDER BY created_at DESC"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<DataSource>> {
        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM data_source
             WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<DataSource>> {
        let row = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM data_source WHERE url = $1"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_row))
    }

    async fn find_due_to_crawl(&self, limit: i64) -> Result<Vec<DataSource>> {
        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM data_source
             WHERE is_enabled = TRUE
               AND (next_crawl_at IS NULL OR next_crawl_at <= NOW())
               AND crawl_status != 'crawling'
             ORDER BY next_crawl_at ASC NULLS FIRST
             LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<DataSource>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM data_source")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM data_source
             ORDER BY created_at DESC OFFSET $1 LIMIT $2"
        ))
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok((rows.iter().map(Self::parse_row).collect(), total))
    }

    async fn save(&self, source: &DataSource) -> Result<()> {
        sqlx::query(
            "INSERT INTO data_source (id, organization_id, user_id, name, url, feed_url,
                source_type, crawl_frequency, is_enabled, is_discovered, discovered_from_id,
                last_crawled_at, next_crawl_at, crawl_status, error_message, content_count,
                subscriber_count, metadata, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20)",
        )
        .bind(source.id)
        .bind(source.organization_id)
        .bind(source.user_id)
        .bind(&source.name)
        .bind(&source.url)
        .bind(&source.feed_url)
        .bind(source.source_type.as_str())
        .bind(source.crawl_frequency.as_str())
        .bind(source.is_enabled)
        .bind(source.is_discovered)
        .bind(source.discovered_from_id)
        .bind(source.last_crawled_at)
        .bind(source.next_crawl_at)
        .bind(source.crawl_status.as_str())
        .bind(&source.error_message)
        .bind(source.content_count)
        .bind(source.subscriber_count)
        .bind(&source.metadata)
        .bind(source.created_at)
        .bind(source.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &source.url))?;
        Ok(())
    }

    async fn update(&self, source: &DataSource) -> Result<()> {
        let result = sqlx::query(
            "UPDATE data_source SET
                name = $1, url = $2, feed_url = $3, source_type = $4, crawl_frequency = $5,
                is_enabled = $6, next_crawl_at = $7, crawl_status = $8, metadata = $9,
                updated_at = $10
             WHERE id = $11",
        )
        .bind(&source.name)
        .bind(&source.url)
        .bind(&source.feed_url)
        .bind(source.source_type.as_str())
        .bind(source.crawl_frequency.as_str())
        .bind(source.is_enabled)
        .bind(source.next_crawl_at)
        .bind(source.crawl_status.as_str())
        .bind(&source.metadata)
        .bind(Utc::now())
        .bind(source.id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &source.url))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("data source {}", source.id)));
        }
        Ok(())
    }

    async fn update_crawl_status(
        &self,
        id: Uuid,
        status: CrawlStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let query = if status == CrawlStatus::Success {
            "UPDATE data_source SET crawl_status = $1, last_crawled_at = NOW(),
                error_message = NULL, updated_at = NOW()
             WHERE id = $2"
        } else {
            "UPDATE data_source SET crawl_status = $1,
                error_message = COALESCE($3, error_message), updated_at = NOW()
             WHERE id = $2"
        };

        let mut q = sqlx::query(query).bind(status.as_str()).bind(id);
        if status != CrawlStatus::Success {
            q = q.bind(error_message);
        }
        q.execute(&self.pool).await.map_err(Error::Database)?;
        Ok(())
    }

    async fn update_next_crawl_at(&self, id: Uuid, next: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE data_source SET next_crawl_at = $1, updated_at = NOW() WHERE id = $2")
            .bind(next)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn increment_content_count(&self, id: Uuid, delta: i32) -> Result<()> {
        sqlx::query(
            "UPDATE data_source SET content_count = content_count + $1, updated_at = NOW()
             WHERE id = $2",
        )
        .bind(delta)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM data_source WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
