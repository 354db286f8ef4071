//! OpenAI embeddings backend implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use cerberus_core::defaults::{EMBED_DIMENSION, EMBED_MODEL, EMBED_TIMEOUT_SECS, OPENAI_URL};
use cerberus_core::{EmbeddingBackend, Error, Result, Vector};

use super::error::{to_embedding_error, OpenAIErrorCode};
use super::types::*;

/// Configuration for the OpenAI embeddings backend.
///
/// ## Environment Variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `OPENAI_API_KEY` | (unset disables embeddings) | Bearer token |
/// | `OPENAI_BASE_URL` | `https://api.openai.com/v1` | API base URL |
/// | `OPENAI_EMBED_MODEL` | `text-embedding-3-small` | Embedding model |
/// | `OPENAI_EMBED_DIM` | `1536` | Expected vector dimension |
/// | `OPENAI_TIMEOUT_SECS` | `60` | Request timeout |
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub base_url: String,
    pub api_key: String,
    pub embed_model: String,
    pub embed_dimension: usize,
    pub timeout_seconds: u64,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: OPENAI_URL.to_string(),
            api_key: String::new(),
            embed_model: EMBED_MODEL.to_string(),
            embed_dimension: EMBED_DIMENSION,
            timeout_seconds: EMBED_TIMEOUT_SECS,
        }
    }
}

impl OpenAIConfig {
    /// Load from environment. Returns None if `OPENAI_API_KEY` is unset or empty.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())?;

        Some(Self {
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| OPENAI_URL.to_string()),
            api_key,
            embed_model: std::env::var("OPENAI_EMBED_MODEL")
                .unwrap_or_else(|_| EMBED_MODEL.to_string()),
            embed_dimension: std::env::var("OPENAI_EMBED_DIM")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(EMBED_DIMENSION),
            timeout_seconds: std::env::var("OPENAI_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(EMBED_TIMEOUT_SECS),
        })
    }
}

/// Embedding backend for the OpenAI `/embeddings` endpoint.
pub struct OpenAIEmbeddingBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIEmbeddingBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            base_url = %config.base_url,
            model = %config.embed_model,
            dimension = config.embed_dimension,
            "Initializing OpenAI embedding backend"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables. None when no API key is configured.
    pub fn from_env() -> Option<Result<Self>> {
        OpenAIConfig::from_env().map(Self::new)
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let request = EmbeddingRequest {
            model: &self.config.embed_model,
            input: texts,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (error_type, message) = match serde_json::from_str::<OpenAIErrorResponse>(&body) {
                Ok(parsed) => (
                    parsed.error.code.unwrap_or(parsed.error.error_type),
                    parsed.error.message,
                ),
                Err(_) => (String::new(), body),
            };
            let code = OpenAIErrorCode::from_response(status.as_u16(), &error_type);
            warn!(
                status = status.as_u16(),
                retryable = code.is_retryable(),
                "OpenAI embeddings request rejected"
            );
            return Err(to_embedding_error(code, &message));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        let mut vectors = Vec::with_capacity(data.len());
        for d in data {
            if d.embedding.len() != self.config.embed_dimension {
                return Err(Error::Embedding(format!(
                    "Dimension mismatch: expected {}, got {}",
                    self.config.embed_dimension,
                    d.embedding.len()
                )));
            }
            vectors.push(Vector::from(d.embedding));
        }

        debug!(
            count = vectors.len(),
            prompt_tokens = result.usage.map(|u| u.prompt_tokens).unwrap_or(0),
            "Generated embeddings"
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}
