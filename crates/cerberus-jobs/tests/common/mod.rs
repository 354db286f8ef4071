//! In-memory collaborators shared by the pipeline and worker tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use cerberus_core::{
    AnalysisResult, Artifact, ArtifactEmbedding, ArtifactRepository, ContentStore,
    EmbeddingRepository, Error, EventEnvelope, InProcessEventBus, ProcessingStatus, Result,
    UsageRecord, UsageSink,
};
use cerberus_inference::mock::{MockAnalysisBackend, MockEmbeddingBackend};
use cerberus_inference::MetricsTracker;
use cerberus_jobs::{AnalysisOrchestrator, EmbeddingsStage, ExtractorRegistry, WorkerEvent};

// ============================================================================
// STORE
// ============================================================================

#[derive(Default)]
struct State {
    artifacts: HashMap<Uuid, Artifact>,
    analyses: HashMap<Uuid, AnalysisResult>,
    embeddings: HashMap<Uuid, ArtifactEmbedding>,
    claim_attempts: usize,
    replace_calls: usize,
    fail_replace_analysis: bool,
}

/// Artifact and embedding rows with the same conditional transitions as
/// the PostgreSQL repositories.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn insert(&self, artifact: Artifact) {
        self.lock().artifacts.insert(artifact.artifact_id, artifact);
    }

    pub fn artifact(&self, id: Uuid) -> Artifact {
        self.lock().artifacts.get(&id).cloned().expect("artifact exists")
    }

    pub fn status(&self, id: Uuid) -> ProcessingStatus {
        self.artifact(id).processing_status
    }

    pub fn analysis(&self, id: Uuid) -> Option<AnalysisResult> {
        self.lock().analyses.get(&id).cloned()
    }

    pub fn count_with_status(&self, status: ProcessingStatus) -> usize {
        self.lock()
            .artifacts
            .values()
            .filter(|a| a.processing_status == status)
            .count()
    }

    pub fn claim_attempts(&self) -> usize {
        self.lock().claim_attempts
    }

    pub fn replace_calls(&self) -> usize {
        self.lock().replace_calls
    }

    /// Make `replace_analysis` fail with a persistence error.
    pub fn fail_replace_analysis(&self) {
        self.lock().fail_replace_analysis = true;
    }
}

#[async_trait]
impl ArtifactRepository for InMemoryStore {
    async fn get(&self, artifact_id: Uuid) -> Result<Option<Artifact>> {
        Ok(self.lock().artifacts.get(&artifact_id).cloned())
    }

    async fn list_pending(&self, limit: usize) -> Result<Vec<Artifact>> {
        let mut pending: Vec<Artifact> = self
            .lock()
            .artifacts
            .values()
            .filter(|a| a.processing_status == ProcessingStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|a| a.uploaded_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn claim(&self, artifact_id: Uuid) -> Result<bool> {
        let mut state = self.lock();
        state.claim_attempts += 1;
        match state.artifacts.get_mut(&artifact_id) {
            Some(a) if a.processing_status == ProcessingStatus::Pending => {
                a.processing_status = ProcessingStatus::Processing;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn store_extracted_text(&self, artifact_id: Uuid, text: &str) -> Result<()> {
        let mut state = self.lock();
        let artifact = state
            .artifacts
            .get_mut(&artifact_id)
            .ok_or_else(|| Error::NotFound(artifact_id.to_string()))?;
        artifact.raw_content = Some(text.to_string());
        Ok(())
    }

    async fn replace_analysis(&self, artifact_id: Uuid, result: &AnalysisResult) -> Result<()> {
        let mut state = self.lock();
        state.replace_calls += 1;
        if state.fail_replace_analysis {
            return Err(Error::Persistence("connection reset".to_string()));
        }
        state.analyses.insert(artifact_id, result.clone());
        if let Some(category) = &result.document_type {
            if let Some(a) = state.artifacts.get_mut(&artifact_id) {
                a.artifact_category = Some(category.clone());
            }
        }
        Ok(())
    }

    async fn get_analysis(&self, artifact_id: Uuid) -> Result<Option<AnalysisResult>> {
        Ok(self.analysis(artifact_id))
    }

    async fn mark_completed(
        &self,
        artifact_id: Uuid,
        model: &str,
        processing_time_ms: i32,
    ) -> Result<()> {
        let mut state = self.lock();
        if let Some(a) = state.artifacts.get_mut(&artifact_id) {
            if a.processing_status == ProcessingStatus::Processing {
                a.processing_status = ProcessingStatus::Completed;
                a.ai_model_version = Some(model.to_string());
                a.ai_processing_time_ms = Some(processing_time_ms);
                a.processing_error = None;
                a.processed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, artifact_id: Uuid, error: &str) -> Result<()> {
        let mut state = self.lock();
        if let Some(a) = state.artifacts.get_mut(&artifact_id) {
            if a.processing_status == ProcessingStatus::Processing {
                a.processing_status = ProcessingStatus::Failed;
                a.processing_error = Some(error.to_string());
                a.processed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn reset_for_reanalysis(&self, artifact_id: Uuid) -> Result<bool> {
        let mut state = self.lock();
        let reset = match state.artifacts.get_mut(&artifact_id) {
            Some(a) if a.processing_status.is_terminal() => {
                a.processing_status = ProcessingStatus::Pending;
                a.processing_error = None;
                true
            }
            _ => false,
        };
        if reset {
            state.embeddings.remove(&artifact_id);
        }
        Ok(reset)
    }
}

#[async_trait]
impl EmbeddingRepository for InMemoryStore {
    async fn upsert(&self, embedding: &ArtifactEmbedding) -> Result<()> {
        self.lock()
            .embeddings
            .insert(embedding.artifact_id, embedding.clone());
        Ok(())
    }

    async fn get(&self, artifact_id: Uuid) -> Result<Option<ArtifactEmbedding>> {
        Ok(self.lock().embeddings.get(&artifact_id).cloned())
    }

    async fn count_for(&self, artifact_id: Uuid) -> Result<i64> {
        Ok(self.lock().embeddings.contains_key(&artifact_id) as i64)
    }

    async fn delete(&self, artifact_id: Uuid) -> Result<()> {
        self.lock().embeddings.remove(&artifact_id);
        Ok(())
    }
}

// ============================================================================
// CONTENT & USAGE
// ============================================================================

/// Raw bytes keyed by storage path.
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryContentStore {
    pub fn put(&self, storage_path: &str, data: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(storage_path.to_string(), data.to_vec());
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn fetch(&self, artifact: &Artifact) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(&artifact.storage_path)
            .cloned()
            .ok_or_else(|| Error::NotFound(artifact.storage_path.clone()))
    }
}

/// Usage sink that keeps every record.
#[derive(Clone, Default)]
pub struct RecordingSink {
    records: Arc<Mutex<Vec<UsageRecord>>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageSink for RecordingSink {
    async fn record(&self, record: &UsageRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// Wires fakes and mock backends into an orchestrator.
pub struct Harness {
    pub store: InMemoryStore,
    pub content: MemoryContentStore,
    pub bus: Arc<InProcessEventBus>,
    pub sink: RecordingSink,
    pub metrics: Arc<MetricsTracker>,
    pub program_id: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        let sink = RecordingSink::default();
        Self {
            store: InMemoryStore::new(),
            content: MemoryContentStore::default(),
            bus: Arc::new(InProcessEventBus::new(64)),
            metrics: Arc::new(MetricsTracker::default().with_sink(Arc::new(sink.clone()))),
            sink,
            program_id: Uuid::new_v4(),
        }
    }

    /// Insert a pending artifact with its content.
    ///
    /// `age_secs` back-dates the upload so poll ordering is deterministic.
    pub fn add_artifact_aged(&self, filename: &str, mime_type: &str, data: &[u8], age_secs: i64) -> Artifact {
        let storage_path = format!("uploads/{}", Uuid::new_v4());
        let mut artifact = Artifact::new_pending(
            self.program_id,
            filename,
            mime_type,
            storage_path.clone(),
            data.len() as i64,
        );
        artifact.uploaded_at = Utc::now() - ChronoDuration::seconds(age_secs);
        self.content.put(&storage_path, data);
        self.store.insert(artifact.clone());
        artifact
    }

    pub fn add_artifact(&self, filename: &str, mime_type: &str, data: &[u8]) -> Artifact {
        self.add_artifact_aged(filename, mime_type, data, 0)
    }

    pub fn orchestrator(
        &self,
        registry: ExtractorRegistry,
        analysis: MockAnalysisBackend,
    ) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(
            Arc::new(self.store.clone()),
            Arc::new(self.content.clone()),
            Arc::new(registry),
            Arc::new(analysis),
            self.bus.clone(),
            self.metrics.clone(),
        )
    }

    pub fn embeddings_stage(&self, backend: MockEmbeddingBackend) -> EmbeddingsStage {
        EmbeddingsStage::new(
            Arc::new(backend),
            Arc::new(self.store.clone()),
            Arc::new(self.store.clone()),
            self.metrics.clone(),
        )
    }
}

/// Drain envelopes already published to a tap.
pub fn drain(rx: &mut broadcast::Receiver<EventEnvelope>) -> Vec<EventEnvelope> {
    let mut out = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        out.push(envelope);
    }
    out
}

/// Wait until a worker event matches, or panic after `timeout`.
pub async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<WorkerEvent>,
    timeout: Duration,
    mut matches: F,
) -> WorkerEvent
where
    F: FnMut(&WorkerEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("worker event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for worker event")
}
