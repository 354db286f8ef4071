//! Event handler feeding `artifact.uploaded` deliveries to the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use cerberus_core::{ArtifactEvent, Error, EventEnvelope, EventHandler, Result};

use crate::analysis::{AnalysisOrchestrator, Trigger};

/// Processes the artifact named by an `artifact.uploaded` envelope.
///
/// Undecodable envelopes and unknown artifacts are errors for the bus to
/// log; the artifact itself is left for the reconciliation poll.
pub struct ArtifactUploadedHandler {
    orchestrator: Arc<AnalysisOrchestrator>,
    permits: Option<Arc<Semaphore>>,
}

impl ArtifactUploadedHandler {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self {
            orchestrator,
            permits: None,
        }
    }

    /// Hold a permit from `permits` for each processing run.
    pub fn with_permits(mut self, permits: Arc<Semaphore>) -> Self {
        self.permits = Some(permits);
        self
    }
}

#[async_trait]
impl EventHandler for ArtifactUploadedHandler {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let event = envelope.decode().inspect_err(|e| {
            warn!(event_id = %envelope.id, error = %e, "Dropping malformed upload event");
        })?;

        let ArtifactEvent::Uploaded { artifact_id, .. } = event else {
            return Err(Error::InvalidInput(format!(
                "expected artifact.uploaded, got {}",
                event.kind()
            )));
        };

        let Some(artifact) = self.orchestrator.artifacts().get(artifact_id).await? else {
            warn!(
                event_id = %envelope.id,
                artifact_id = %artifact_id,
                "Upload event for unknown artifact"
            );
            return Err(Error::NotFound(format!("artifact {}", artifact_id)));
        };

        // The semaphore is never closed.
        let _permit = match &self.permits {
            Some(permits) => permits.clone().acquire_owned().await.ok(),
            None => None,
        };

        let trigger = Trigger::Event {
            correlation_id: envelope.correlation_id.clone(),
            event_id: envelope.id,
        };
        let outcome = self
            .orchestrator
            .process_artifact(&artifact, &trigger)
            .await?;
        debug!(
            event_id = %envelope.id,
            artifact_id = %artifact_id,
            outcome = ?outcome,
            "Upload event handled"
        );
        Ok(())
    }
}
