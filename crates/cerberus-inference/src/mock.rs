//! Mock AI backends for deterministic testing.
//!
//! Enabled in this crate's tests and, for downstream crates, through the
//! `mock` feature.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cerberus_inference::mock::{MockAnalysisBackend, MockEmbeddingBackend};
//!
//! let analysis = MockAnalysisBackend::new().with_summary("Quarterly budget review");
//! let embeddings = MockEmbeddingBackend::new().with_dimension(8);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use cerberus_core::{
    AnalysisBackend, AnalysisResponse, AnalysisResult, EmbeddingBackend, Error, ProgramContext,
    Result, Summary, TokenUsage, Vector, VisionBackend,
};

/// A call observed by a mock backend.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
    pub timestamp: std::time::Instant,
}

#[derive(Clone, Default)]
struct CallLog(Arc<Mutex<Vec<MockCall>>>);

impl CallLog {
    fn lock(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, operation: &str, input: &str) {
        self.lock().push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
            timestamp: std::time::Instant::now(),
        });
    }

    fn calls(&self) -> Vec<MockCall> {
        self.lock().clone()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

async fn simulate_latency(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

// =============================================================================
// ANALYSIS
// =============================================================================

#[derive(Debug, Clone)]
struct MockAnalysisConfig {
    result: AnalysisResult,
    usage: TokenUsage,
    model: String,
    latency: Duration,
    failure: Option<String>,
}

impl Default for MockAnalysisConfig {
    fn default() -> Self {
        Self {
            result: AnalysisResult {
                summary: Summary {
                    executive_summary: "Mock summary".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
            usage: TokenUsage {
                input_tokens: 1000,
                output_tokens: 200,
                cache_read_input_tokens: 0,
            },
            model: "mock-analysis".to_string(),
            latency: Duration::ZERO,
            failure: None,
        }
    }
}

/// Analysis backend returning a configured result.
#[derive(Clone, Default)]
pub struct MockAnalysisBackend {
    config: Arc<MockAnalysisConfig>,
    call_log: CallLog,
}

impl MockAnalysisBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return this result from every call.
    pub fn with_result(mut self, result: AnalysisResult) -> Self {
        Arc::make_mut(&mut self.config).result = result;
        self
    }

    /// Shorthand for a result carrying only an executive summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).result.summary.executive_summary = summary.into();
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        Arc::make_mut(&mut self.config).usage = usage;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).model = model.into();
        self
    }

    /// Set simulated latency for every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).latency = latency;
        self
    }

    /// Fail every call with `Error::AiProvider(message)`.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).failure = Some(message.into());
        self
    }

    /// Texts passed to `analyze`, in call order.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.calls()
    }

    pub fn call_count(&self) -> usize {
        self.call_log.len()
    }
}

#[async_trait]
impl AnalysisBackend for MockAnalysisBackend {
    async fn analyze(&self, text: &str, _context: &ProgramContext) -> Result<AnalysisResponse> {
        self.call_log.push("analyze", text);
        simulate_latency(self.config.latency).await;

        if let Some(message) = &self.config.failure {
            return Err(Error::AiProvider(message.clone()));
        }

        Ok(AnalysisResponse {
            result: self.config.result.clone(),
            usage: self.config.usage,
            model: self.config.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// =============================================================================
// EMBEDDINGS
// =============================================================================

#[derive(Debug, Clone)]
struct MockEmbeddingConfig {
    dimension: usize,
    model: String,
    failure: Option<String>,
}

impl Default for MockEmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: 16,
            model: "mock-embed".to_string(),
            failure: None,
        }
    }
}

/// Embedding backend producing deterministic vectors from text content.
#[derive(Clone, Default)]
pub struct MockEmbeddingBackend {
    config: Arc<MockEmbeddingConfig>,
    call_log: CallLog,
}

impl MockEmbeddingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).model = model.into();
        self
    }

    /// Fail every call with `Error::Embedding(message)`.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).failure = Some(message.into());
        self
    }

    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.calls()
    }

    pub fn call_count(&self) -> usize {
        self.call_log.len()
    }
}

/// Deterministic unit vector derived from the text bytes.
pub fn deterministic_vector(text: &str, dimension: usize) -> Vec<f32> {
    // FNV-1a seed, then an LCG for the components.
    let mut state: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        state ^= byte as u64;
        state = state.wrapping_mul(0x0100_0000_01b3);
    }

    let mut values: Vec<f32> = (0..dimension)
        .map(|_| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            ((state >> 33) as f32 / (1u64 << 31) as f32) * 2.0 - 1.0
        })
        .collect();

    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|v| *v /= norm);
    }
    values
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        for text in texts {
            self.call_log.push("embed", text);
        }
        if let Some(message) = &self.config.failure {
            return Err(Error::Embedding(message.clone()));
        }
        Ok(texts
            .iter()
            .map(|t| Vector::from(deterministic_vector(t, self.config.dimension)))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// =============================================================================
// VISION
// =============================================================================

/// Vision backend returning a fixed transcription.
#[derive(Clone)]
pub struct MockVisionBackend {
    transcription: Arc<String>,
    failure: Option<Arc<String>>,
    call_log: CallLog,
}

impl MockVisionBackend {
    pub fn new(transcription: impl Into<String>) -> Self {
        Self {
            transcription: Arc::new(transcription.into()),
            failure: None,
            call_log: CallLog::default(),
        }
    }

    /// Fail every call with `Error::AiProvider(message)`.
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(Arc::new(message.into()));
        self
    }

    /// Media types passed to `transcribe`, in call order.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.calls()
    }

    pub fn call_count(&self) -> usize {
        self.call_log.len()
    }
}

#[async_trait]
impl VisionBackend for MockVisionBackend {
    async fn transcribe(&self, _image: &[u8], media_type: &str, _prompt: &str) -> Result<String> {
        self.call_log.push("transcribe", media_type);
        if let Some(message) = &self.failure {
            return Err(Error::AiProvider(message.to_string()));
        }
        Ok(self.transcription.to_string())
    }

    fn model_name(&self) -> &str {
        "mock-vision"
    }
}
