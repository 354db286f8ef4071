//! Analysis orchestration: claim, extract, analyze, persist, publish.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use cerberus_core::defaults::{ANALYSIS_TIMEOUT_SECS, EVENT_SOURCE_ARTIFACTS};
use cerberus_core::{
    AnalysisBackend, AnalysisResponse, Artifact, ArtifactEvent, ArtifactRepository, ContentStore,
    ContextProvider, Error, EventBus, EventEnvelope, EventMetadata, ProgramContext, Result,
    StaticContextProvider, TokenUsage,
};
use cerberus_inference::{CallRecord, MetricsTracker};

use crate::embeddings::EmbeddingsStage;
use crate::extraction::ExtractorRegistry;
use crate::worker::WorkerEvent;

/// Operation label for analysis calls in metrics and usage records.
pub const ANALYZE_OPERATION: &str = "analyze";

/// Error recorded on artifacts abandoned when the worker stops.
pub const SHUTDOWN_INTERRUPTED: &str = "interrupted by shutdown";

/// What caused a processing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// An `artifact.uploaded` delivery.
    Event {
        correlation_id: Option<String>,
        event_id: Uuid,
    },
    /// The reconciliation poll.
    Poll,
}

impl Trigger {
    pub fn label(&self) -> &'static str {
        match self {
            Trigger::Event { .. } => "event",
            Trigger::Poll => "poll",
        }
    }

    /// Correlation ID to carry onto resulting events.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Trigger::Event { correlation_id, .. } => correlation_id.as_deref(),
            Trigger::Poll => None,
        }
    }
}

/// Result of one `process_artifact` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Analysis stored and the artifact marked completed.
    Completed,
    /// The artifact was marked failed with this error text.
    Failed { error: String },
    /// Another trigger holds the claim; nothing was done.
    AlreadyClaimed,
}

/// Runs the full pipeline for one artifact.
///
/// The claim is the only gate: whichever trigger wins it owns the artifact
/// until it reaches a terminal state.
pub struct AnalysisOrchestrator {
    artifacts: Arc<dyn ArtifactRepository>,
    content: Arc<dyn ContentStore>,
    registry: Arc<ExtractorRegistry>,
    analysis: Arc<dyn AnalysisBackend>,
    context: Arc<dyn ContextProvider>,
    bus: Arc<dyn EventBus>,
    metrics: Arc<MetricsTracker>,
    embeddings: Option<EmbeddingsStage>,
    analysis_timeout: Duration,
    events: Option<broadcast::Sender<WorkerEvent>>,
    /// Artifacts this process has claimed and not yet finished.
    in_flight: Mutex<HashSet<Uuid>>,
}

impl AnalysisOrchestrator {
    pub fn new(
        artifacts: Arc<dyn ArtifactRepository>,
        content: Arc<dyn ContentStore>,
        registry: Arc<ExtractorRegistry>,
        analysis: Arc<dyn AnalysisBackend>,
        bus: Arc<dyn EventBus>,
        metrics: Arc<MetricsTracker>,
    ) -> Self {
        Self {
            artifacts,
            content,
            registry,
            analysis,
            context: Arc::new(StaticContextProvider),
            bus,
            metrics,
            embeddings: None,
            analysis_timeout: Duration::from_secs(ANALYSIS_TIMEOUT_SECS),
            events: None,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Run the embeddings stage after each successful analysis.
    pub fn with_embeddings(mut self, stage: EmbeddingsStage) -> Self {
        self.embeddings = Some(stage);
        self
    }

    pub fn with_context_provider(mut self, context: Arc<dyn ContextProvider>) -> Self {
        self.context = context;
        self
    }

    pub fn with_analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout = timeout;
        self
    }

    /// Emit claim and outcome events on this channel.
    pub fn with_events(mut self, events: broadcast::Sender<WorkerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: WorkerEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactRepository> {
        &self.artifacts
    }

    pub fn metrics(&self) -> &Arc<MetricsTracker> {
        &self.metrics
    }

    pub fn has_embeddings(&self) -> bool {
        self.embeddings.is_some()
    }

    /// Artifacts claimed by this orchestrator whose run has not returned.
    pub fn in_flight(&self) -> Vec<Uuid> {
        self.in_flight
            .lock()
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    fn track(&self, artifact_id: Uuid, running: bool) {
        if let Ok(mut set) = self.in_flight.lock() {
            if running {
                set.insert(artifact_id);
            } else {
                set.remove(&artifact_id);
            }
        }
    }

    /// Mark every still-tracked artifact failed with `reason`.
    ///
    /// Runs whose tasks were dropped mid-flight never reach a terminal
    /// state on their own; failing them makes them eligible for
    /// reanalysis. Returns the artifacts that were marked.
    pub async fn fail_in_flight(&self, reason: &str) -> Vec<Uuid> {
        let stranded: Vec<Uuid> = match self.in_flight.lock() {
            Ok(mut set) => set.drain().collect(),
            Err(_) => Vec::new(),
        };

        for &artifact_id in &stranded {
            match self.artifacts.mark_failed(artifact_id, reason).await {
                Ok(()) => {
                    warn!(artifact_id = %artifact_id, reason, "Abandoned artifact marked failed");
                    self.emit(WorkerEvent::ArtifactFailed {
                        artifact_id,
                        error: reason.to_string(),
                    });
                }
                Err(e) => {
                    error!(artifact_id = %artifact_id, error = %e, "Failed to mark abandoned artifact failed");
                }
            }
        }
        stranded
    }

    /// Process one artifact end to end.
    ///
    /// Returns `Ok(AlreadyClaimed)` without side effects when the claim is
    /// lost. Non-fatal errors end the artifact `failed` and are reported as
    /// `Ok(Failed)`; persistence errors are returned.
    pub async fn process_artifact(
        &self,
        artifact: &Artifact,
        trigger: &Trigger,
    ) -> Result<ProcessOutcome> {
        let artifact_id = artifact.artifact_id;

        if !self.artifacts.claim(artifact_id).await? {
            debug!(
                artifact_id = %artifact_id,
                trigger = trigger.label(),
                "Claim skipped, artifact already taken"
            );
            self.emit(WorkerEvent::ClaimSkipped { artifact_id });
            return Ok(ProcessOutcome::AlreadyClaimed);
        }
        self.emit(WorkerEvent::ArtifactClaimed {
            artifact_id,
            trigger: trigger.label(),
        });

        // An aborted run never untracks, leaving the ID for fail_in_flight.
        self.track(artifact_id, true);
        let outcome = self.process_claimed(artifact, trigger).await;
        self.track(artifact_id, false);
        outcome
    }

    async fn process_claimed(
        &self,
        artifact: &Artifact,
        trigger: &Trigger,
    ) -> Result<ProcessOutcome> {
        let artifact_id = artifact.artifact_id;

        info!(
            subsystem = "jobs",
            component = "orchestrator",
            op = "process_artifact",
            artifact_id = %artifact_id,
            program_id = %artifact.program_id,
            trigger = trigger.label(),
            correlation_id = trigger.correlation_id().unwrap_or(""),
            mime_type = %artifact.mime_type,
            "Processing artifact"
        );

        let start = Instant::now();
        let response = match self.run_claimed(artifact, start).await {
            Ok(response) => response,
            Err(e) if e.is_fatal() => {
                error!(artifact_id = %artifact_id, error = %e, "Persistence failure while processing artifact");
                if let Err(mark_err) = self.artifacts.mark_failed(artifact_id, &e.to_string()).await {
                    error!(artifact_id = %artifact_id, error = %mark_err, "Failed to mark artifact failed");
                }
                self.emit(WorkerEvent::ArtifactFailed {
                    artifact_id,
                    error: e.to_string(),
                });
                return Err(e);
            }
            Err(e) => {
                let message = e.to_string();
                warn!(
                    artifact_id = %artifact_id,
                    trigger = trigger.label(),
                    error_kind = e.kind(),
                    error = %message,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Artifact processing failed"
                );
                if let Err(mark_err) = self.artifacts.mark_failed(artifact_id, &message).await {
                    error!(artifact_id = %artifact_id, error = %mark_err, "Failed to mark artifact failed");
                    return Err(mark_err);
                }
                self.emit(WorkerEvent::ArtifactFailed {
                    artifact_id,
                    error: message.clone(),
                });
                return Ok(ProcessOutcome::Failed { error: message });
            }
        };

        info!(
            subsystem = "jobs",
            component = "orchestrator",
            op = "process_artifact",
            artifact_id = %artifact_id,
            model = %response.model,
            topics = response.result.topics.len(),
            facts = response.result.facts.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Artifact analyzed"
        );
        self.emit(WorkerEvent::ArtifactCompleted { artifact_id });

        let correlation_id = trigger.correlation_id().map(String::from);
        let metadata = EventMetadata {
            ai_generated: true,
            confidence: response.result.summary.confidence,
            artifact_refs: vec![artifact_id],
        };
        self.publish(
            ArtifactEvent::Analyzed {
                artifact_id,
                program_id: artifact.program_id,
            },
            correlation_id.clone(),
            Some(metadata),
        )
        .await;

        if let Some(stage) = &self.embeddings {
            match stage.generate(artifact_id).await {
                Ok(()) => {
                    self.publish(
                        ArtifactEvent::EmbeddingsCreated {
                            artifact_id,
                            program_id: artifact.program_id,
                        },
                        correlation_id,
                        None,
                    )
                    .await;
                }
                Err(e) => {
                    warn!(
                        artifact_id = %artifact_id,
                        error_kind = e.kind(),
                        error = %e,
                        "Embedding generation failed, continuing"
                    );
                }
            }
        }

        Ok(ProcessOutcome::Completed)
    }

    /// Steps after a successful claim up to `mark_completed`.
    async fn run_claimed(&self, artifact: &Artifact, start: Instant) -> Result<AnalysisResponse> {
        let artifact_id = artifact.artifact_id;

        let bytes = self.content.fetch(artifact).await?;
        let text = self.extract_text(artifact, &bytes).await?;
        self.artifacts.store_extracted_text(artifact_id, &text).await?;

        let context = self.program_context(artifact.program_id).await;
        let response = self.analyze(artifact, &text, &context).await?;

        self.artifacts
            .replace_analysis(artifact_id, &response.result)
            .await?;

        let processing_time_ms = i32::try_from(start.elapsed().as_millis()).unwrap_or(i32::MAX);
        self.artifacts
            .mark_completed(artifact_id, &response.model, processing_time_ms)
            .await?;

        Ok(response)
    }

    /// Registry dispatch, with one OCR retry for text-less PDFs.
    async fn extract_text(&self, artifact: &Artifact, bytes: &[u8]) -> Result<String> {
        match self.registry.extract(&artifact.mime_type, bytes).await {
            Ok(text) => Ok(text),
            Err(e) if e.is_empty_content() && artifact.mime_type.starts_with("application/pdf") => {
                let Some(ocr) = self.registry.ocr_fallback() else {
                    return Err(e);
                };
                warn!(
                    artifact_id = %artifact.artifact_id,
                    extractor = ocr.name(),
                    "PDF has no text layer, falling back to OCR"
                );
                ocr.extract(bytes).await
            }
            Err(e) => Err(e),
        }
    }

    async fn program_context(&self, program_id: Uuid) -> ProgramContext {
        match self.context.program_context(program_id).await {
            Ok(context) => context,
            Err(e) => {
                warn!(program_id = %program_id, error = %e, "Program context lookup failed, using defaults");
                ProgramContext::fallback()
            }
        }
    }

    /// Call the analysis backend under the timeout and record the call.
    async fn analyze(
        &self,
        artifact: &Artifact,
        text: &str,
        context: &ProgramContext,
    ) -> Result<AnalysisResponse> {
        let call_start = Instant::now();
        let outcome =
            match tokio::time::timeout(self.analysis_timeout, self.analysis.analyze(text, context))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(Error::AiProvider(format!(
                    "analysis timed out after {}s",
                    self.analysis_timeout.as_secs()
                ))),
            };
        let duration = call_start.elapsed();

        let (usage, model) = match &outcome {
            Ok(response) => (response.usage, response.model.as_str()),
            Err(_) => (TokenUsage::default(), self.analysis.model_name()),
        };
        let cost_usd = self
            .metrics
            .record(CallRecord {
                operation: ANALYZE_OPERATION,
                model,
                program_id: Some(artifact.program_id),
                usage,
                duration,
                error: outcome.as_ref().err(),
            })
            .await;

        debug!(
            artifact_id = %artifact.artifact_id,
            model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost_usd,
            duration_ms = duration.as_millis() as u64,
            "Analysis call finished"
        );

        outcome
    }

    /// Publish an event; failures are logged, never propagated.
    async fn publish(
        &self,
        event: ArtifactEvent,
        correlation_id: Option<String>,
        metadata: Option<EventMetadata>,
    ) {
        let kind = event.kind();
        let envelope = match EventEnvelope::from_event(&event) {
            Ok(envelope) => envelope
                .with_source(EVENT_SOURCE_ARTIFACTS)
                .with_correlation_id(correlation_id),
            Err(e) => {
                warn!(event_type = %kind, error = %e, "Refusing to publish invalid event");
                return;
            }
        };
        let envelope = match metadata {
            Some(metadata) => envelope.with_metadata(metadata),
            None => envelope,
        };

        if let Err(e) = self.bus.publish(envelope).await {
            warn!(
                event_type = %kind,
                artifact_id = %event.artifact_id(),
                error = %e,
                "Failed to publish event"
            );
        }
    }

    /// Reset a terminal artifact to pending and announce it for processing.
    ///
    /// Returns `false` when the artifact is not completed or failed.
    pub async fn request_reanalysis(&self, artifact_id: Uuid) -> Result<bool> {
        let artifact = self
            .artifacts
            .get(artifact_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("artifact {}", artifact_id)))?;

        if !self.artifacts.reset_for_reanalysis(artifact_id).await? {
            debug!(
                artifact_id = %artifact_id,
                status = artifact.processing_status.as_str(),
                "Reanalysis skipped, artifact not in a terminal state"
            );
            return Ok(false);
        }

        info!(
            subsystem = "jobs",
            component = "orchestrator",
            op = "request_reanalysis",
            artifact_id = %artifact_id,
            program_id = %artifact.program_id,
            "Artifact reset for reanalysis"
        );

        let envelope = EventEnvelope::from_event(&ArtifactEvent::Uploaded {
            artifact_id,
            program_id: artifact.program_id,
        })?
        .with_source(EVENT_SOURCE_ARTIFACTS);
        if let Err(e) = self.bus.publish(envelope).await {
            warn!(
                artifact_id = %artifact_id,
                error = %e,
                "Failed to publish reanalysis event, poll will pick it up"
            );
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_correlation() {
        let event = Trigger::Event {
            correlation_id: Some("req-7".to_string()),
            event_id: Uuid::now_v7(),
        };
        assert_eq!(event.label(), "event");
        assert_eq!(event.correlation_id(), Some("req-7"));
        assert_eq!(Trigger::Poll.label(), "poll");
        assert_eq!(Trigger::Poll.correlation_id(), None);
    }
}
