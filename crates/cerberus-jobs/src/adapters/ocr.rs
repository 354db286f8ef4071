//! OCR extractor using a vision backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use cerberus_core::{Error, Extractor, Result, VisionBackend};
use cerberus_inference::prompts::OCR_TRANSCRIPTION_PROMPT;

use super::pdf::has_pdf_header;

const IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg", "image/gif", "image/webp"];

/// Transcribes images through a vision model.
///
/// Also registered for `application/pdf` so scanned PDFs reach it as a
/// fallback, but PDF rasterisation is not wired and such input fails with
/// `NotImplemented`.
pub struct OcrExtractor {
    vision: Option<Arc<dyn VisionBackend>>,
}

impl OcrExtractor {
    pub fn new(vision: Option<Arc<dyn VisionBackend>>) -> Self {
        Self { vision }
    }
}

/// Image media type from magic bytes, PNG when unknown.
fn detect_media_type(data: &[u8]) -> &'static str {
    match infer::get(data).map(|kind| kind.mime_type()) {
        Some("image/jpeg") => "image/jpeg",
        Some("image/gif") => "image/gif",
        Some("image/webp") => "image/webp",
        _ => "image/png",
    }
}

#[async_trait]
impl Extractor for OcrExtractor {
    fn can_handle(&self, mime_type: &str) -> bool {
        mime_type.starts_with("application/pdf") || IMAGE_TYPES.contains(&mime_type)
    }

    async fn extract(&self, data: &[u8]) -> Result<String> {
        let vision = self.vision.as_ref().ok_or_else(|| {
            Error::NotConfigured("vision backend not configured for image OCR".to_string())
        })?;

        if has_pdf_header(data) {
            return Err(Error::NotImplemented(
                "scanned PDF OCR requires PDF-to-image conversion; upload pages as PNG or JPEG"
                    .to_string(),
            ));
        }

        let media_type = detect_media_type(data);
        debug!(media_type, bytes = data.len(), model = vision.model_name(), "Running OCR");

        let text = vision
            .transcribe(data, media_type, OCR_TRANSCRIPTION_PROMPT)
            .await?;

        if text.trim().is_empty() {
            return Err(Error::EmptyContent(
                "no text extracted from image via OCR".to_string(),
            ));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "ocr"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.vision.is_some())
    }
}
