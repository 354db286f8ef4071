//! Core traits for the artifact pipeline.
//!
//! These traits define the seams between orchestration and its
//! collaborators (storage, AI providers, extractors), enabling pluggable
//! backends and in-memory fakes in tests.

use async_trait::async_trait;
use pgvector::Vector;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Converts raw artifact bytes into plain text.
///
/// Extractors are registered in order; the first one whose `can_handle`
/// accepts a media type is the one that runs.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Whether this extractor accepts the given media type.
    fn can_handle(&self, mime_type: &str) -> bool;

    /// Extract text from the full artifact bytes.
    async fn extract(&self, data: &[u8]) -> Result<String>;

    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Check that external dependencies (binaries, backends) are available.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

// =============================================================================
// REPOSITORIES
// =============================================================================

/// Artifact rows and their analysis results.
///
/// Every status write is a conditional transition so concurrent triggers
/// cannot move an artifact backwards.
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// Fetch an artifact by ID, `None` if missing or deleted.
    async fn get(&self, artifact_id: Uuid) -> Result<Option<Artifact>>;

    /// Pending artifacts, oldest upload first.
    async fn list_pending(&self, limit: usize) -> Result<Vec<Artifact>>;

    /// Atomically move `pending -> processing`.
    ///
    /// Returns `true` only for the caller whose update changed the row.
    async fn claim(&self, artifact_id: Uuid) -> Result<bool>;

    /// Store the extracted text on the artifact.
    async fn store_extracted_text(&self, artifact_id: Uuid, text: &str) -> Result<()>;

    /// Replace all analysis rows for the artifact in one transaction.
    async fn replace_analysis(&self, artifact_id: Uuid, result: &AnalysisResult) -> Result<()>;

    /// Read back the stored analysis, `None` if never analyzed.
    async fn get_analysis(&self, artifact_id: Uuid) -> Result<Option<AnalysisResult>>;

    /// `processing -> completed`, recording model and duration.
    async fn mark_completed(
        &self,
        artifact_id: Uuid,
        model: &str,
        processing_time_ms: i32,
    ) -> Result<()>;

    /// `processing -> failed`, recording the error text.
    async fn mark_failed(&self, artifact_id: Uuid, error: &str) -> Result<()>;

    /// `{completed, failed} -> pending`. Returns `false` when the artifact
    /// is not in a terminal state.
    async fn reset_for_reanalysis(&self, artifact_id: Uuid) -> Result<bool>;
}

/// One embedding vector per artifact.
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// Insert or overwrite the vector for `embedding.artifact_id`.
    async fn upsert(&self, embedding: &ArtifactEmbedding) -> Result<()>;

    async fn get(&self, artifact_id: Uuid) -> Result<Option<ArtifactEmbedding>>;

    /// Stored vectors for the artifact (0 or 1).
    async fn count_for(&self, artifact_id: Uuid) -> Result<i64>;

    async fn delete(&self, artifact_id: Uuid) -> Result<()>;
}

/// Resolves an artifact's raw bytes.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn fetch(&self, artifact: &Artifact) -> Result<Vec<u8>>;
}

/// Supplies program identity for the analysis prompt.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn program_context(&self, program_id: Uuid) -> Result<ProgramContext>;
}

/// Context provider that always returns the fallback program.
///
/// Placeholder until a program directory lookup is wired in.
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider;

#[async_trait]
impl ContextProvider for StaticContextProvider {
    async fn program_context(&self, _program_id: Uuid) -> Result<ProgramContext> {
        Ok(ProgramContext::fallback())
    }
}

/// Durable destination for AI usage records.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, record: &UsageRecord) -> Result<()>;
}

// =============================================================================
// AI BACKENDS
// =============================================================================

/// Produces structured metadata from extracted text.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn analyze(&self, text: &str, context: &ProgramContext) -> Result<AnalysisResponse>;

    /// Model identifier recorded on the artifact.
    fn model_name(&self) -> &str;
}

/// Produces vector embeddings for text.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// One vector per input text, in order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Transcribes text from images.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn transcribe(&self, image: &[u8], media_type: &str, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}
