//! Insight repository implementation.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use uuid::Uuid;

use pulse_core::{Error, Insight, InsightRepository, Result};

const INSIGHT_COLUMNS: &str = "id, organization_id, topic_id, title, summary, content, \
     key_points, source_content_ids, embedding, generated_at, period_start, period_end, \
     is_read, is_pinned, is_used_in_article, metadata";

/// PostgreSQL implementation of InsightRepository.
pub struct PgInsightRepository {
    pool: Pool<Postgres>,
}

impl PgInsightRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(r: &PgRow) -> Insight {
        Insight {
            id: r.get("id"),
            organization_id: r.get("organization_id"),
            topic_id: r.get("topic_id"),
            title: r.get("title"),
            summary: r.get("summary"),
            content: r.get("content"),
            key_points: r.get("key_points"),
            source_content_ids: r.get("source_content_ids"),
            embedding: r.get("embedding"),
            generated_at: r.get("generated_at"),
            period_start: r.get("period_start"),
            period_end: r.get("period_end"),
            is_read: r.get("is_read"),
            is_pinned: r.get("is_pinned"),
            is_used_in_article: r.get("is_used_in_article"),
            metadata: r.get("metadata"),
        }
    }

    /// Shared paged query over a filtered column.
    async fn page_where(
        &self,
        column: &str,
        value: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Insight>, i64)> {
        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM insight WHERE {column} = $1"))
                .bind(value)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;

        let rows = sqlx::query(&format!(
            "SELECT {INSIGHT_COLUMNS} FROM insight WHERE {column} = $1
             ORDER BY generated_at DESC OFFSET $2 LIMIT $3"
        ))
        .bind(value)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok((rows.iter().map(Self::parse_row).collect(), total))
    }

    async fn set_flag(&self, id: Uuid, column: &str) -> Result<bool> {
        let result = sqlx::query(&format!("UPDATE insight SET {column} = TRUE WHERE id = $1"))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl InsightRepository for PgInsightRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Insight>> {
        let row = sqlx::query(&format!(
            "SELECT {INSIGHT_COLUMNS} FROM insight WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_row))
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<(Vec<Insight>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM insight")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        let rows = sqlx::query(&format!(
            "SELECT {INSIGHT_COLUMNS} FROM insight
             ORDER BY generated_at DESC OFFSET $1 LIMIT $2"
        ))
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok((rows.iter().map(Self::parse_row).collect(), total))
    }

    async fn find_by_organization(
        &self,
        organization_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Insight>, i64)> {
        self.page_where("organization_id", organization_id, offset, limit)
            .await
    }

    async fn find_by_topic(
        &self,
        topic_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Insight>, i64)> {
        self.page_where("topic_id", topic_id, offset, limit).await
    }

    async fn find_unread(&self, organization_id: Uuid, limit: i64) -> Result<Vec<Insight>> {
        let rows = sqlx::query(&format!(
            "SELECT {INSIGHT_COLUMNS} FROM insight
             WHERE organization_id = $1 AND is_read = FALSE
             ORDER BY generated_at DESC LIMIT $2"
        ))
        .bind(organization_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn search_similar(&self, embedding: &Vector, limit: i64) -> Result<Vec<(Insight, f64)>> {
        let rows = sqlx::query(&format!(
            "SELECT {INSIGHT_COLUMNS}, 1.0 - (embedding <=> $1::vector) AS score
             FROM insight
             WHERE embedding IS NOT NULL
             ORDER BY embedding <=> $1::vector
             LIMIT $2"
        ))
        .bind(embedding)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|r| (Self::parse_row(r), r.get::<f64, _>("score")))
            .collect())
    }

    async fn search_similar_by_org(
        &self,
        organization_id: Uuid,
        embedding: &Vector,
        limit: i64,
    ) -> Result<Vec<(Insight, f64)>> {
        let rows = sqlx::query(&format!(
            "SELECT {INSIGHT_COLUMNS}, 1.0 - (embedding <=> $2::vector) AS score
             FROM insight
             WHERE organization_id = $1 AND embedding IS NOT NULL
             ORDER BY embedding <=> $2::vector
             LIMIT $3"
        ))
        .bind(organization_id)
        .bind(embedding)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|r| (Self::parse_row(r), r.get::<f64, _>("score")))
            .collect())
    }

    async fn save(&self, insight: &Insight) -> Result<()> {
        sqlx::query(
            "INSERT INTO insight (id, organization_id, topic_id, title, summary, content,
                key_points, source_content_ids, embedding, generated_at, period_start,
                period_end, is_read, is_pinned, is_used_in_article, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(insight.id)
        .bind(insight.organization_id)
        .bind(insight.topic_id)
        .bind(&insight.title)
        .bind(&insight.summary)
        .bind(&insight.content)
        .bind(&insight.key_points)
        .bind(&insight.source_content_ids)
        .bind(&insight.embedding)
        .bind(insight.generated_at)
        .bind(insight.period_start)
        .bind(insight.period_end)
        .bind(insight.is_read)
        .bind(insight.is_pinned)
        .bind(insight.is_used_in_article)
        .bind(&insight.metadata)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn mark_as_read(&self, id: Uuid) -> Result<bool> {
        self.set_flag(id, "is_read").await
    }

    async fn toggle_pinned(&self, id: Uuid) -> Result<Option<bool>> {
        let pinned: Option<bool> = sqlx::query_scalar(
            "UPDATE insight SET is_pinned = NOT is_pinned WHERE id = $1 RETURNING is_pinned",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(pinned)
    }

    async fn mark_as_used_in_article(&self, id: Uuid) -> Result<bool> {
        self.set_flag(id, "is_used_in_article").await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM insight WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_unread(&self, organization_id: Uuid) -> Result<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM insight WHERE organization_id = $1 AND is_read = FALSE",
        )
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn count_all_unread(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM insight WHERE is_read = FALSE")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}
