//! Content-to-topic match repository implementation.

use async_trait::async_trait;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use uuid::Uuid;

use pulse_core::{ContentTopicMatch, ContentTopicMatchRepository, Error, Result};

/// PostgreSQL implementation of ContentTopicMatchRepository.
pub struct PgContentTopicMatchRepository {
    pool: Pool<Postgres>,
}

impl PgContentTopicMatchRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(r: &PgRow) -> ContentTopicMatch {
        ContentTopicMatch {
            id: r.get("id"),
            content_id: r.get("content_id"),
            topic_id: r.get("topic_id"),
            similarity_score: r.get("similarity_score"),
            is_primary: r.get("is_primary"),
            created_at: r.get("created_at"),
        }
    }
}

#[async_trait]
impl ContentTopicMatchRepository for PgContentTopicMatchRepository {
    async fn save_batch(&self, matches: &[ContentTopicMatch]) -> Result<()> {
        if matches.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        for m in matches {
            sqlx::query(
                "INSERT INTO content_topic_match
                    (id, content_id, topic_id, similarity_score, is_primary, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (content_id, topic_id) DO UPDATE SET
                    similarity_score = EXCLUDED.similarity_score,
                    is_primary = EXCLUDED.is_primary",
            )
            .bind(m.id)
            .bind(m.content_id)
            .bind(m.topic_id)
            .bind(m.similarity_score)
            .bind(m.is_primary)
            .bind(m.created_at)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn count_by_topic(&self, topic_id: Uuid) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM content_topic_match WHERE topic_id = $1")
            .bind(topic_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn find_primary_by_topic(
        &self,
        topic_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<ContentTopicMatch>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM content_topic_match WHERE topic_id = $1 AND is_primary = TRUE",
        )
        .bind(topic_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let rows = sqlx::query(
            "SELECT id, content_id, topic_id, similarity_score, is_primary, created_at
             FROM content_topic_match
             WHERE topic_id = $1 AND is_primary = TRUE
             ORDER BY created_at DESC
             OFFSET $2 LIMIT $3",
        )
        .bind(topic_id)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok((rows.iter().map(Self::parse_row).collect(), total))
    }
}
