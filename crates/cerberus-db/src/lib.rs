//! # cerberus-db
//!
//! PostgreSQL storage layer for the artifact pipeline.
//!
//! This crate provides:
//! - A pool sized from worker concurrency
//! - Artifact rows with conditional status transitions
//! - Transactional replacement of analysis results
//! - One pgvector embedding per artifact
//! - The `ai_usage` ledger
//!
//! ## Example
//!
//! ```rust,ignore
//! use cerberus_db::{ArtifactRepository, Database};
//!
//! let db = Database::connect("postgres://localhost/cerberus").await?;
//! for artifact in db.artifacts.list_pending(10).await? {
//!     if db.artifacts.claim(artifact.artifact_id).await? {
//!         // this caller owns the artifact now
//!     }
//! }
//! ```

pub mod artifacts;
pub mod embeddings;
pub mod pool;
pub mod usage;

// Shared by the ignored live-database tests
pub mod test_fixtures;

// Re-export core types
pub use cerberus_core::{
    AnalysisResult, Artifact, ArtifactEmbedding, ArtifactRepository, EmbeddingRepository, Error,
    ProcessingStatus, Result, UsageRecord, UsageSink,
};

pub use artifacts::PgArtifactRepository;
pub use embeddings::PgEmbeddingRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use usage::{PgUsageRepository, UsageTotals};

/// Pool plus the three repositories the worker needs.
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Artifact rows and analysis results.
    pub artifacts: PgArtifactRepository,
    /// Embedding vectors, one per artifact.
    pub embeddings: PgEmbeddingRepository,
    /// AI usage ledger.
    pub usage: PgUsageRepository,
}

impl Database {
    /// Wrap an existing pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            artifacts: PgArtifactRepository::new(pool.clone()),
            embeddings: PgEmbeddingRepository::new(pool.clone()),
            usage: PgUsageRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect with the default pool sizing.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Apply the pipeline schema from the workspace `migrations/` directory.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Persistence(format!("migration failed: {}", e)))?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}
