//! Insight topic repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use uuid::Uuid;

use pulse_core::{Error, InsightTopic, InsightTopicRepository, Result};

const TOPIC_COLUMNS: &str = "id, organization_id, name, description, keywords, embedding, \
     is_auto_generated, content_count, last_insight_at, color, icon, created_at, updated_at";

/// PostgreSQL implementation of InsightTopicRepository.
pub struct PgInsightTopicRepository {
    pool: Pool<Postgres>,
}

impl PgInsightTopicRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(r: &PgRow) -> InsightTopic {
        InsightTopic {
            id: r.get("id"),
            organization_id: r.get("organization_id"),
            name: r.get("name"),
            description: r.get("description"),
            keywords: r.get("keywords"),
            embedding: r.get("embedding"),
            is_auto_generated: r.get("is_auto_generated"),
            content_count: r.get("content_count"),
            last_insight_at: r.get("last_insight_at"),
            color: r.get("color"),
            icon: r.get("icon"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }
    }
}

#[async_trait]
impl InsightTopicRepository for PgInsightTopicRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<InsightTopic>> {
        let row = sqlx::query(&format!(
            "SELECT {TOPIC_COLUMNS} FROM insight_topic WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_row))
    }

    async fn find_by_organization(&self, organization_id: Uuid) -> Result<Vec<InsightTopic>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOPIC_COLUMNS} FROM insight_topic
             WHERE organization_id = $1 ORDER BY name"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn find_all(&self) -> Result<Vec<InsightTopic>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOPIC_COLUMNS} FROM insight_topic ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_row).collect())
    }

    async fn search_similar(
        &self,
        embedding: &Vector,
        limit: i64,
        threshold: f64,
    ) -> Result<Vec<(InsightTopic, f64)>> {
        let rows = sqlx::query(&format!(
            "SELECT {TOPIC_COLUMNS}, 1.0 - (embedding <=> $1::vector) AS score
             FROM insight_topic
             WHERE embedding IS NOT NULL
               AND 1.0 - (embedding <=> $1::vector) >= $2
             ORDER BY embedding <=> $1::vector
             LIMIT $3"
        ))
        .bind(embedding)
        .bind(threshold)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|r| (Self::parse_row(r), r.get::<f64, _>("score")))
            .collect())
    }

    async fn save(&self, topic: &InsightTopic) -> Result<()> {
        sqlx::query(
            "INSERT INTO insight_topic (id, organization_id, name, description, keywords,
                embedding, is_auto_generated, content_count, last_insight_at, color, icon,
                created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(topic.id)
        .bind(topic.organization_id)
        .bind(&topic.name)
        .bind(&topic.description)
        .bind(&topic.keywords)
        .bind(&topic.embedding)
        .bind(topic.is_auto_generated)
        .bind(topic.content_count)
        .bind(topic.last_insight_at)
        .bind(&topic.color)
        .bind(&topic.icon)
        .bind(topic.created_at)
        .bind(topic.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn update(&self, topic: &InsightTopic) -> Result<()> {
        let result = sqlx::query(
            "UPDATE insight_topic SET
                name = $1, description = $2, keywords = $3, embedding = $4,
                color = $5, icon = $6, updated_at = NOW()
             WHERE id = $7",
        )
        .bind(&topic.name)
        .bind(&topic.description)
        .bind(&topic.keywords)
        .bind(&topic.embedding)
        .bind(&topic.color)
        .bind(&topic.icon)
        .bind(topic.id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("topic {}", topic.id)));
        }
        Ok(())
    }

    async fn update_content_count(&self, id: Uuid, count: i64) -> Result<()> {
        sqlx::query("UPDATE insight_topic SET content_count = $1, updated_at = NOW() WHERE id = $2")
            .bind(count as i32)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn update_last_insight_at(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE insight_topic SET last_insight_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM insight_topic WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
