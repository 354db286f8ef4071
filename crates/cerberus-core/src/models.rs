//! Domain models for artifacts and their analysis results.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

// =============================================================================
// ARTIFACT
// =============================================================================

/// Processing state of an artifact.
///
/// Transitions are `pending -> processing -> {completed, failed}`; terminal
/// states go back to `pending` only through an explicit reanalyze request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// Completed and failed are terminal for a given trigger.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processing" => Ok(ProcessingStatus::Processing),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(Error::InvalidInput(format!(
                "unknown processing status: {}",
                other
            ))),
        }
    }
}

/// An uploaded document tracked through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: Uuid,
    /// Tenant/workspace scope.
    pub program_id: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub file_size_bytes: i64,
    /// Handle the content store resolves to raw bytes.
    pub storage_path: String,
    /// Extracted text, written once extraction succeeds.
    pub raw_content: Option<String>,
    pub processing_status: ProcessingStatus,
    pub artifact_category: Option<String>,
    pub ai_model_version: Option<String>,
    pub ai_processing_time_ms: Option<i32>,
    /// Last failure cause, kept for operator visibility.
    pub processing_error: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Artifact {
    /// New pending artifact as the upload collaborator would create it.
    pub fn new_pending(
        program_id: Uuid,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        storage_path: impl Into<String>,
        file_size_bytes: i64,
    ) -> Self {
        Self {
            artifact_id: Uuid::new_v4(),
            program_id,
            filename: filename.into(),
            mime_type: mime_type.into(),
            file_size_bytes,
            storage_path: storage_path.into(),
            raw_content: None,
            processing_status: ProcessingStatus::Pending,
            artifact_category: None,
            ai_model_version: None,
            ai_processing_time_ms: None,
            processing_error: None,
            uploaded_at: Utc::now(),
            processed_at: None,
        }
    }
}

// =============================================================================
// ANALYSIS RESULT
// =============================================================================

/// Executive summary of an artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub executive_summary: String,
    #[serde(default)]
    pub key_takeaways: Vec<String>,
    pub sentiment: Option<String>,
    pub priority: Option<i32>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub role: Option<String>,
    pub organization: Option<String>,
    /// Snippet showing where the person is mentioned.
    pub context: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub fact_type: String,
    pub key: String,
    pub value: String,
    pub numeric_value: Option<f64>,
    pub date_value: Option<NaiveDate>,
    pub unit: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub insight_type: String,
    pub title: String,
    pub description: String,
    pub severity: Option<String>,
    pub suggested_action: Option<String>,
    #[serde(default)]
    pub impacted_modules: Vec<String>,
    pub confidence: Option<f64>,
}

/// Structured metadata produced by one successful analysis.
///
/// Persisting a result replaces any earlier one for the same artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: Summary,
    pub topics: Vec<Topic>,
    pub persons: Vec<Person>,
    pub facts: Vec<Fact>,
    pub insights: Vec<Insight>,
    /// Classified document type, copied to `artifact_category`.
    pub document_type: Option<String>,
    pub document_type_confidence: Option<f64>,
}

/// Token accounting reported by the analysis provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Input tokens served from the provider's prompt cache.
    pub cache_read_input_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// What an analysis backend returns for one call.
#[derive(Debug, Clone)]
pub struct AnalysisResponse {
    pub result: AnalysisResult,
    pub usage: TokenUsage,
    pub model: String,
}

/// Program identity handed to the analysis prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramContext {
    pub program_name: String,
    pub program_code: String,
    pub company_name: Option<String>,
}

impl ProgramContext {
    /// Placeholder context used when no per-program lookup is wired.
    pub fn fallback() -> Self {
        Self {
            program_name: crate::defaults::FALLBACK_PROGRAM_NAME.to_string(),
            program_code: crate::defaults::FALLBACK_PROGRAM_CODE.to_string(),
            company_name: None,
        }
    }

    /// Render the context block included in the analysis prompt.
    pub fn to_prompt_string(&self) -> String {
        let mut out = format!("Program: {}", self.program_name);
        if !self.program_code.is_empty() {
            out.push_str(&format!(" ({})", self.program_code));
        }
        out.push('\n');
        if let Some(company) = self.company_name.as_deref().filter(|c| !c.is_empty()) {
            out.push_str(&format!("Company: {}\n", company));
        }
        out
    }
}

// =============================================================================
// EMBEDDINGS & USAGE
// =============================================================================

/// One vector per artifact, keyed by artifact ID.
#[derive(Debug, Clone)]
pub struct ArtifactEmbedding {
    pub artifact_id: Uuid,
    pub vector: Vector,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

/// A single AI invocation as recorded by the metrics tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub program_id: Option<Uuid>,
    /// Pipeline module that made the call (e.g. "artifacts").
    pub module: String,
    /// Logical operation ("analyze", "embed", "ocr").
    pub operation: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub success: bool,
    pub error_kind: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
