//! Plain-text extractor for text-like media types.

use async_trait::async_trait;

use cerberus_core::{Error, Extractor, Result};

const TEXT_TYPES: &[&str] = &[
    "text/plain",
    "text/markdown",
    "text/csv",
    "text/html",
    "text/xml",
    "application/json",
    "application/xml",
];

/// Returns UTF-8 text unchanged.
///
/// Media types match by prefix so parameters like `; charset=utf-8` pass.
pub struct TextExtractor;

#[async_trait]
impl Extractor for TextExtractor {
    fn can_handle(&self, mime_type: &str) -> bool {
        TEXT_TYPES.iter().any(|t| mime_type.starts_with(t))
    }

    async fn extract(&self, data: &[u8]) -> Result<String> {
        let text = std::str::from_utf8(data).map_err(|e| {
            Error::InvalidEncoding(format!("file is not valid UTF-8 text: {}", e))
        })?;

        if text.trim().is_empty() {
            return Err(Error::EmptyContent(
                "file contains no text content".to_string(),
            ));
        }

        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        "text"
    }
}
