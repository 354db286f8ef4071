//! Embeddings side-pipeline: one vector per analyzed artifact.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use cerberus_core::defaults::EMBED_MAX_INPUT_CHARS;
use cerberus_core::text::{estimate_tokens, truncate_chars};
use cerberus_core::{
    ArtifactEmbedding, ArtifactRepository, EmbeddingBackend, EmbeddingRepository, Error, Result,
    TokenUsage,
};
use cerberus_inference::{CallRecord, MetricsTracker};

/// Operation label for embedding calls in metrics and usage records.
pub const EMBED_OPERATION: &str = "embed";

/// Embeds an artifact's stored text and upserts the vector.
///
/// Runs after analysis completes; re-running overwrites the single stored
/// vector.
#[derive(Clone)]
pub struct EmbeddingsStage {
    backend: Arc<dyn EmbeddingBackend>,
    artifacts: Arc<dyn ArtifactRepository>,
    embeddings: Arc<dyn EmbeddingRepository>,
    metrics: Arc<MetricsTracker>,
}

impl EmbeddingsStage {
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        artifacts: Arc<dyn ArtifactRepository>,
        embeddings: Arc<dyn EmbeddingRepository>,
        metrics: Arc<MetricsTracker>,
    ) -> Self {
        Self {
            backend,
            artifacts,
            embeddings,
            metrics,
        }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Generate and store the embedding for one artifact.
    pub async fn generate(&self, artifact_id: Uuid) -> Result<()> {
        let artifact = self
            .artifacts
            .get(artifact_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("artifact {}", artifact_id)))?;

        let text = artifact
            .raw_content
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                Error::EmptyContent(format!("artifact {} has no stored text", artifact_id))
            })?;
        let input = truncate_chars(text, EMBED_MAX_INPUT_CHARS);

        let start = Instant::now();
        let result = self.backend.embed_texts(&[input.to_string()]).await;
        let duration = start.elapsed();

        let usage = TokenUsage {
            input_tokens: estimate_tokens(input),
            ..Default::default()
        };
        self.metrics
            .record(CallRecord {
                operation: EMBED_OPERATION,
                model: self.backend.model_name(),
                program_id: Some(artifact.program_id),
                usage,
                duration,
                error: result.as_ref().err(),
            })
            .await;

        let vector = result?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("backend returned no vectors".to_string()))?;

        debug!(
            artifact_id = %artifact_id,
            chars = input.chars().count(),
            truncated = input.len() < text.len(),
            "Embedding generated"
        );

        self.embeddings
            .upsert(&ArtifactEmbedding {
                artifact_id,
                vector,
                model: self.backend.model_name().to_string(),
                created_at: Utc::now(),
            })
            .await?;

        info!(
            subsystem = "jobs",
            component = "embeddings",
            op = "generate",
            artifact_id = %artifact_id,
            program_id = %artifact.program_id,
            duration_ms = duration.as_millis() as u64,
            "Embedding stored"
        );
        Ok(())
    }
}
