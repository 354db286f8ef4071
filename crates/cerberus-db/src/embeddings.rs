//! Embedding repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use cerberus_core::{ArtifactEmbedding, EmbeddingRepository, Result};

/// PostgreSQL implementation of EmbeddingRepository.
///
/// Vectors are keyed by artifact; writing again overwrites.
pub struct PgEmbeddingRepository {
    pool: Pool<Postgres>,
}

impl PgEmbeddingRepository {
    /// Create a new PgEmbeddingRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmbeddingRepository for PgEmbeddingRepository {
    async fn upsert(&self, embedding: &ArtifactEmbedding) -> Result<()> {
        sqlx::query(
            "INSERT INTO artifact_embeddings (artifact_id, vector, model, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (artifact_id) DO UPDATE
             SET vector = EXCLUDED.vector,
                 model = EXCLUDED.model,
                 created_at = EXCLUDED.created_at",
        )
        .bind(embedding.artifact_id)
        .bind(&embedding.vector)
        .bind(&embedding.model)
        .bind(embedding.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, artifact_id: Uuid) -> Result<Option<ArtifactEmbedding>> {
        let row = sqlx::query(
            "SELECT artifact_id, vector, model, created_at
             FROM artifact_embeddings
             WHERE artifact_id = $1",
        )
        .bind(artifact_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ArtifactEmbedding {
            artifact_id: row.try_get("artifact_id")?,
            vector: row.try_get("vector")?,
            model: row.try_get("model")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn count_for(&self, artifact_id: Uuid) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM artifact_embeddings WHERE artifact_id = $1")
                .bind(artifact_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn delete(&self, artifact_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM artifact_embeddings WHERE artifact_id = $1")
            .bind(artifact_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
