//! HTTP client for the Anthropic Messages API with bounded retries.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, warn};

use cerberus_core::defaults::{
    ANALYSIS_MAX_TOKENS, ANALYSIS_MODEL, ANTHROPIC_MAX_ATTEMPTS, ANTHROPIC_RETRY_BASE_MS,
    ANTHROPIC_TIMEOUT_SECS, ANTHROPIC_URL, ANTHROPIC_VERSION,
};
use cerberus_core::{Error, Result};

use super::error::{to_provider_error, AnthropicErrorCode};
use super::types::{AnthropicErrorResponse, MessagesRequest, MessagesResponse};

/// Configuration for Claude backends.
///
/// ## Environment Variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `ANTHROPIC_API_KEY` | (required) | API key sent as `x-api-key` |
/// | `ANTHROPIC_BASE_URL` | `https://api.anthropic.com/v1` | API base URL |
/// | `ANTHROPIC_MODEL` | `claude-sonnet-4-5-20250929` | Analysis model |
/// | `ANTHROPIC_TIMEOUT_SECS` | `120` | Per-request HTTP timeout |
#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Attempts per request, first try included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per further attempt.
    pub retry_base: Duration,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            base_url: ANTHROPIC_URL.to_string(),
            api_key: String::new(),
            model: ANALYSIS_MODEL.to_string(),
            max_tokens: ANALYSIS_MAX_TOKENS,
            timeout_secs: ANTHROPIC_TIMEOUT_SECS,
            max_attempts: ANTHROPIC_MAX_ATTEMPTS,
            retry_base: Duration::from_millis(ANTHROPIC_RETRY_BASE_MS),
        }
    }
}

impl ClaudeConfig {
    /// Load from environment. A missing API key is a configuration error.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("ANTHROPIC_API_KEY is not set".to_string()))?;

        let mut config = Self {
            api_key,
            ..Self::default()
        };
        if let Ok(url) = std::env::var("ANTHROPIC_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("ANTHROPIC_MODEL") {
            config.model = model;
        }
        if let Some(secs) = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.timeout_secs = secs;
        }
        Ok(config)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

struct SendFailure {
    error: Error,
    retryable: bool,
}

/// Shared Messages API client used by the analysis and vision backends.
#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    config: ClaudeConfig,
}

impl ClaudeClient {
    pub fn new(config: ClaudeConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::Config("Anthropic API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "anthropic",
            base_url = %config.base_url,
            model = %config.model,
            "Initializing Claude client"
        );

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClaudeConfig {
        &self.config
    }

    /// Send a request, retrying rate limits, 5xx, and transport failures.
    pub async fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.send_once(request).await {
                Ok(response) => {
                    debug!(
                        model = %response.model,
                        attempt,
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        "Claude request succeeded"
                    );
                    return Ok(response);
                }
                Err(failure) if failure.retryable && attempt < max_attempts => {
                    let delay = self.config.retry_base * 2u32.pow(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.error,
                        "Claude request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }

    async fn send_once(
        &self,
        request: &MessagesRequest,
    ) -> std::result::Result<MessagesResponse, SendFailure> {
        let url = format!("{}/messages", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| SendFailure {
                retryable: e.is_timeout() || e.is_connect() || e.is_request(),
                error: Error::AiProvider(format!("request failed: {}", e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (error_type, message) = match serde_json::from_str::<AnthropicErrorResponse>(&body)
            {
                Ok(parsed) => (parsed.error.error_type, parsed.error.message),
                Err(_) => (String::new(), body),
            };
            let code = AnthropicErrorCode::from_response(status.as_u16(), &error_type);
            return Err(SendFailure {
                retryable: code.is_retryable(),
                error: to_provider_error(status.as_u16(), code, &message),
            });
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| SendFailure {
                retryable: false,
                error: Error::AiProvider(format!("failed to decode response: {}", e)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClaudeConfig::default();
        assert_eq!(config.base_url, ANTHROPIC_URL);
        assert_eq!(config.model, "claude-sonnet-4-5-20250929");
        assert_eq!(config.max_tokens, 8192);
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_base, Duration::from_secs(1));
        assert!(config.api_key.is_empty());
    }

    #[test]
    fn test_client_requires_api_key() {
        let result = ClaudeClient::new(ClaudeConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builders() {
        let config = ClaudeConfig::default()
            .with_api_key("sk-test")
            .with_base_url("http://localhost:9999")
            .with_model("claude-opus-4-5-20251101")
            .with_max_attempts(0);
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.base_url, "http://localhost:9999");
        assert_eq!(config.model, "claude-opus-4-5-20251101");
        assert_eq!(config.max_attempts, 1);
    }
}
