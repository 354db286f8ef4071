//! OpenAI-specific error handling.

use cerberus_core::Error;

/// OpenAI error classes relevant to embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    /// Invalid authentication credentials.
    AuthenticationError,
    /// Rate limit or quota exceeded.
    RateLimitExceeded,
    /// Model not found or not available.
    ModelNotFound,
    /// Input longer than the model accepts.
    ContextLengthExceeded,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type/code.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }
}

/// Convert an OpenAI API failure into a pipeline error.
///
/// Credential and model problems are configuration errors; everything else
/// is an embedding failure.
pub fn to_embedding_error(code: OpenAIErrorCode, message: &str) -> Error {
    match code {
        OpenAIErrorCode::AuthenticationError => {
            Error::Config(format!("OpenAI authentication failed: {}", message))
        }
        OpenAIErrorCode::ModelNotFound => {
            Error::Config(format!("Embedding model not found: {}", message))
        }
        OpenAIErrorCode::RateLimitExceeded => {
            Error::Embedding(format!("Rate limit exceeded: {}", message))
        }
        OpenAIErrorCode::ContextLengthExceeded => {
            Error::Embedding(format!("Input too long: {}", message))
        }
        OpenAIErrorCode::ServerError => Error::Embedding(format!("Server error: {}", message)),
        OpenAIErrorCode::Unknown => Error::Embedding(message.to_string()),
    }
}
