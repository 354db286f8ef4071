//! Error types for the cerberus artifact pipeline.

use thiserror::Error;

/// Result type alias using the pipeline's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for pipeline operations.
///
/// The first group of variants is the extraction/analysis taxonomy that ends
/// an artifact in the `failed` state. `Persistence` is the only variant the
/// orchestrator treats as fatal for the current run.
#[derive(Error, Debug)]
pub enum Error {
    /// No extractor accepts the artifact's media type.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Extraction produced no usable text.
    #[error("Empty content: {0}")]
    EmptyContent(String),

    /// Bytes are not valid in the expected text encoding.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// A required credential or backend is not configured.
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// A code path that is deliberately not wired yet.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Any failure from the external AI analysis capability.
    #[error("AI provider error: {0}")]
    AiProvider(String),

    /// Backing store read/write failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Event bus publish/subscribe failed
    #[error("Event bus error: {0}")]
    EventBus(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable snake_case label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnsupportedFormat(_) => "unsupported_format",
            Error::EmptyContent(_) => "empty_content",
            Error::InvalidEncoding(_) => "invalid_encoding",
            Error::NotConfigured(_) => "not_configured",
            Error::NotImplemented(_) => "not_implemented",
            Error::AiProvider(_) => "ai_provider",
            Error::Persistence(_) => "persistence",
            Error::NotFound(_) => "not_found",
            Error::InvalidInput(_) => "invalid_input",
            Error::Embedding(_) => "embedding",
            Error::Serialization(_) => "serialization",
            Error::Config(_) => "config",
            Error::Request(_) => "request",
            Error::EventBus(_) => "event_bus",
            Error::Internal(_) => "internal",
            Error::Io(_) => "io",
        }
    }

    /// Whether this error aborts the current processing run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Persistence(_))
    }

    /// Whether this is the "no text" signal that may trigger OCR fallback.
    pub fn is_empty_content(&self) -> bool {
        matches!(self, Error::EmptyContent(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
