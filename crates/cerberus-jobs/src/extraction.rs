//! Extractor registry for dispatching artifact bytes by media type.

use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;

use cerberus_core::{Error, Extractor, Result, VisionBackend};

use crate::adapters::{
    EmailExtractor, OcrExtractor, PdfExtractor, SpreadsheetExtractor, TextExtractor, ZipExtractor,
};

/// Ordered list of extractors; the first one accepting a media type wins.
///
/// Dispatch never chains: if the chosen extractor fails, the error is
/// returned as-is. The only second attempt is the orchestrator's explicit
/// OCR fallback via [`ExtractorRegistry::ocr_fallback`].
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn Extractor>>,
    ocr: Option<Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Text, spreadsheet, PDF, email, ZIP, then OCR, in that order.
    ///
    /// The ZIP extractor sees only the document extractors registered
    /// before it; archive members are never sent to OCR or unpacked
    /// recursively. Without a vision backend the OCR extractor is still
    /// registered and fails with `NotConfigured`, so images surface a
    /// clear error.
    pub fn standard(vision: Option<Arc<dyn VisionBackend>>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TextExtractor));
        registry.register(Arc::new(SpreadsheetExtractor::new()));
        registry.register(Arc::new(PdfExtractor::new()));
        registry.register(Arc::new(EmailExtractor));
        let documents = registry.clone();
        registry.register(Arc::new(ZipExtractor::new(documents)));
        registry.register_ocr_fallback(Arc::new(OcrExtractor::new(vision)));
        registry
    }

    /// Append an extractor. Registration order is dispatch order.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        debug!(extractor = extractor.name(), "Registered extractor");
        self.extractors.push(extractor);
    }

    /// Append an extractor and remember it as the OCR fallback.
    pub fn register_ocr_fallback(&mut self, extractor: Arc<dyn Extractor>) {
        self.ocr = Some(extractor.clone());
        self.register(extractor);
    }

    /// First extractor accepting `mime_type`.
    pub fn find(&self, mime_type: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors
            .iter()
            .find(|e| e.can_handle(mime_type))
            .cloned()
    }

    /// Extractor used when PDF text extraction comes back empty.
    pub fn ocr_fallback(&self) -> Option<Arc<dyn Extractor>> {
        self.ocr.clone()
    }

    /// Dispatch to the first matching extractor.
    pub async fn extract(&self, mime_type: &str, data: &[u8]) -> Result<String> {
        let extractor = self.find(mime_type).ok_or_else(|| {
            Error::UnsupportedFormat(format!("no extractor for media type {}", mime_type))
        })?;
        debug!(extractor = extractor.name(), mime_type, "Extractor selected");
        extractor.extract(data).await
    }

    pub fn can_extract(&self, mime_type: &str) -> bool {
        self.find(mime_type).is_some()
    }

    /// Names in dispatch order.
    pub fn names(&self) -> Vec<String> {
        self.extractors.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    /// Run health checks on all registered extractors.
    pub async fn health_check_all(&self) -> Vec<(String, bool)> {
        let checks = self.extractors.iter().map(|e| async move {
            let healthy = e.health_check().await.unwrap_or(false);
            (e.name().to_string(), healthy)
        });
        join_all(checks).await
    }
}
