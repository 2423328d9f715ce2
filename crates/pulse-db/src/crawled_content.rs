//! Crawled content repository implementation.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use uuid::Uuid;

use pulse_core::{ContentSearchHit, CrawledContent, CrawledContentRepository, Error, Result};

use crate::map_unique_violation;

const CONTENT_COLUMNS: &str = "c.id, c.data_source_id, c.url, c.title, c.content, c.summary, \
     c.author, c.published_at, c.embedding, c.metadata, c.created_at";

/// PostgreSQL implementation of CrawledContentRepository.
pub struct PgCrawledContentRepository {
    pool: Pool<Postgres>,
}

impl PgCrawledContentRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(r: &PgRow) -> CrawledContent {
        CrawledContent {
            id: r.get("id"),
            data_source_id: r.get("data_source_id"),
            url: r.get("url"),
            title: r.get("title"),
            content: r.get("content"),
            summary: r.get("summary"),
            author: r.get("author"),
            published_at: r.get("published_at"),
            embedding: r.get("embedding"),
            metadata: r.get("metadata"),
            created_at: r.get("created_at"),
        }
    }

    fn parse_hit(r: &PgRow) -> ContentSearchHit {
        ContentSearchHit {
            content: Self::parse_row(r),
            score: r.get("score"),
        }
    }
}

#[async_trait]
impl CrawledContentRepository for PgCrawledContentRepository {
    async fn find_by_url(
        &self,
        data_source_id: Uuid,
        url: &str,
    ) -> Result<Option<CrawledContent>> {
        let row = sqlx::query(&format!(
            "SELECT {CONTENT_COLUMNS} FROM crawled_content c
             WHERE c.data_source_id = $1 AND c.url = $2"
        ))
        .bind(data_source_id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_row))
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<CrawledContent>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {CONTENT_COLUMNS} FROM crawled_content c WHERE c.id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn save(&self, content: &CrawledContent) -> Result<()> {
        sqlx::query(
            "INSERT INTO crawled_content (id, data_source_id, url, title, content, summary,
                author, published_at, embedding, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(content.id)
        .bind(content.data_source_id)
        .bind(&content.url)
        .bind(&content.title)
        .bind(&content.content)
        .bind(&content.summary)
        .bind(&content.author)
        .bind(content.published_at)
        .bind(&content.embedding)
        .bind(&content.metadata)
        .bind(content.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, &content.url))?;
        Ok(())
    }

    async fn search_similar(
        &self,
        embedding: &Vector,
        limit: i64,
    ) -> Result<Vec<ContentSearchHit>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTENT_COLUMNS}, 1.0 - (c.embedding <=> $1::vector) AS score
             FROM crawled_content c
             WHERE c.embedding IS NOT NULL
             ORDER BY c.embedding <=> $1::vector
             LIMIT $2"
        ))
        .bind(embedding)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_hit).collect())
    }

    async fn search_similar_by_org(
        &self,
        organization_id: Uuid,
        embedding: &Vector,
        limit: i64,
    ) -> Result<Vec<ContentSearchHit>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTENT_COLUMNS}, 1.0 - (c.embedding <=> $2::vector) AS score
             FROM crawled_content c
             JOIN data_source ds ON ds.id = c.data_source_id
             WHERE ds.organization_id = $1 AND c.embedding IS NOT NULL
             ORDER BY c.embedding <=> $2::vector
             LIMIT $3"
        ))
        .bind(organization_id)
        .bind(embedding)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_hit).collect())
    }

    async fn find_recent_by_org(
        &self,
        organization_id: Uuid,
        limit: i64,
    ) -> Result<Vec<CrawledContent>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTENT_COLUMNS}
             FROM crawled_content c
             JOIN data_source ds ON ds.id = c.data_source_id
             WHERE ds.organization_id = $1
             ORDER BY c.created_at DESC
             LIMIT $2"
        ))
        .bind(organization_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn find_by_data_source(
        &self,
        data_source_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<CrawledContent>, i64)> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM crawled_content WHERE data_source_id = $1")
                .bind(data_source_id)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;

        let rows = sqlx::query(&format!(
            "SELECT {CONTENT_COLUMNS} FROM crawled_content c
             WHERE c.data_source_id = $1
             ORDER BY c.created_at DESC OFFSET $2 LIMIT $3"
        ))
        .bind(data_source_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok((rows.iter().map(Self::parse_row).collect(), total))
    }
}
