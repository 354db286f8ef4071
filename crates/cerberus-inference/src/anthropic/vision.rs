//! Claude vision backend for image transcription.

use async_trait::async_trait;
use base64::Engine;
use tracing::debug;

use cerberus_core::defaults::VISION_MAX_TOKENS;
use cerberus_core::{Result, VisionBackend};

use super::client::{ClaudeClient, ClaudeConfig};
use super::types::{ContentBlock, Message, MessagesRequest};

/// Vision backend sending base64 image blocks to Claude.
pub struct ClaudeVisionBackend {
    client: ClaudeClient,
}

impl ClaudeVisionBackend {
    pub fn new(config: ClaudeConfig) -> Result<Self> {
        Ok(Self {
            client: ClaudeClient::new(config)?,
        })
    }

    /// Create from environment variables.
    /// Returns None if `ANTHROPIC_API_KEY` is not set.
    ///
    /// `ANTHROPIC_VISION_MODEL` overrides the model; defaults to the
    /// analysis model.
    pub fn from_env() -> Option<Self> {
        let mut config = ClaudeConfig::from_env().ok()?.with_max_tokens(VISION_MAX_TOKENS);
        if let Ok(model) = std::env::var("ANTHROPIC_VISION_MODEL") {
            if !model.is_empty() {
                config = config.with_model(model);
            }
        }
        Self::new(config).ok()
    }
}

#[async_trait]
impl VisionBackend for ClaudeVisionBackend {
    async fn transcribe(&self, image: &[u8], media_type: &str, prompt: &str) -> Result<String> {
        let data = base64::engine::general_purpose::STANDARD.encode(image);
        let config = self.client.config();

        let request = MessagesRequest {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system: Vec::new(),
            messages: vec![Message::user(vec![
                ContentBlock::base64_image(media_type, data),
                ContentBlock::text(prompt),
            ])],
            temperature: Some(0.0),
        };

        let response = self.client.send(&request).await?;
        let text = response.text();
        debug!(
            media_type,
            image_bytes = image.len(),
            chars = text.len(),
            "Vision transcription complete"
        );
        Ok(text.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.client.config().model
    }
}
