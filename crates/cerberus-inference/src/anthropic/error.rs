//! Anthropic-specific error handling.

use cerberus_core::Error;

/// Anthropic API error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnthropicErrorCode {
    /// Invalid API key.
    AuthenticationError,
    /// Malformed request or prompt too long.
    InvalidRequest,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// API temporarily overloaded (529).
    Overloaded,
    /// Server error.
    ServerError,
    /// Unknown error.
    Unknown,
}

impl AnthropicErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) | (403, _) | (_, "authentication_error") => Self::AuthenticationError,
            (429, _) | (_, "rate_limit_error") => Self::RateLimitExceeded,
            (529, _) | (_, "overloaded_error") => Self::Overloaded,
            (400, _) | (_, "invalid_request_error") => Self::InvalidRequest,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded | Self::Overloaded | Self::ServerError
        )
    }
}

/// Convert an Anthropic API error into a pipeline error.
pub fn to_provider_error(status: u16, code: AnthropicErrorCode, message: &str) -> Error {
    let label = match code {
        AnthropicErrorCode::AuthenticationError => "authentication failed",
        AnthropicErrorCode::InvalidRequest => "invalid request",
        AnthropicErrorCode::RateLimitExceeded => "rate limit exceeded",
        AnthropicErrorCode::Overloaded => "overloaded",
        AnthropicErrorCode::ServerError => "server error",
        AnthropicErrorCode::Unknown => "unexpected response",
    };
    Error::AiProvider(format!("API error ({}): {}: {}", status, label, message))
}
