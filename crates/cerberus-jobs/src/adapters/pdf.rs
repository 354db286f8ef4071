//! PDF text extractor, page by page.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

use cerberus_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use cerberus_core::{Error, Extractor, Result};

/// Splits a PDF into per-page text.
///
/// A page that cannot be read yields `Err` in its slot; the document as a
/// whole only fails when it cannot be opened.
#[async_trait]
pub trait PdfPageSource: Send + Sync {
    async fn pages(&self, data: &[u8]) -> Result<Vec<Result<String>>>;

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Page source backed by poppler-utils (`pdfinfo`, `pdftotext`).
pub struct PopplerPageSource {
    timeout: Duration,
}

impl PopplerPageSource {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(EXTRACTION_CMD_TIMEOUT_SECS),
        }
    }
}

impl Default for PopplerPageSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a command with a timeout, returning stdout as a string.
async fn run_cmd_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<String> {
    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| {
            Error::Internal(format!(
                "External command timed out after {}s",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| Error::Internal(format!("Failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Internal(format!(
            "Command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Page count from `pdfinfo` output.
fn parse_page_count(pdfinfo: &str) -> Option<usize> {
    pdfinfo.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() == "Pages" {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

impl PopplerPageSource {
    async fn page_text(&self, path: &Path, page: usize) -> Result<String> {
        let page = page.to_string();
        run_cmd_with_timeout(
            Command::new("pdftotext")
                .arg("-layout")
                .arg("-f")
                .arg(&page)
                .arg("-l")
                .arg(&page)
                .arg(path)
                .arg("-"),
            self.timeout,
        )
        .await
    }
}

#[async_trait]
impl PdfPageSource for PopplerPageSource {
    async fn pages(&self, data: &[u8]) -> Result<Vec<Result<String>>> {
        let mut tmpfile = NamedTempFile::new()
            .map_err(|e| Error::Internal(format!("Failed to create temp file: {}", e)))?;
        tmpfile
            .write_all(data)
            .map_err(|e| Error::Internal(format!("Failed to write temp file: {}", e)))?;

        let info = run_cmd_with_timeout(Command::new("pdfinfo").arg(tmpfile.path()), self.timeout)
            .await
            .map_err(|e| Error::InvalidInput(format!("failed to open PDF: {}", e)))?;
        let count = parse_page_count(&info).unwrap_or(0);
        debug!(pages = count, "PDF opened");

        let mut pages = Vec::with_capacity(count);
        for page in 1..=count {
            pages.push(self.page_text(tmpfile.path(), page).await);
        }
        Ok(pages)
    }

    async fn health_check(&self) -> Result<bool> {
        match Command::new("pdftotext").arg("-v").output().await {
            // pdftotext -v exits 0 or 99 depending on the poppler version.
            Ok(output) => Ok(output.status.success() || output.status.code() == Some(99)),
            Err(_) => Ok(false),
        }
    }
}

/// Concatenates readable pages, each followed by a blank line.
///
/// Unreadable pages are skipped with a warning. A blank result is
/// `EmptyContent`, which the orchestrator treats as the OCR signal.
pub struct PdfExtractor {
    source: Arc<dyn PdfPageSource>,
}

impl PdfExtractor {
    pub fn new() -> Self {
        Self::with_source(Arc::new(PopplerPageSource::new()))
    }

    pub fn with_source(source: Arc<dyn PdfPageSource>) -> Self {
        Self { source }
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the bytes start with the `%PDF` signature.
pub(crate) fn has_pdf_header(data: &[u8]) -> bool {
    data.starts_with(b"%PDF")
}

#[async_trait]
impl Extractor for PdfExtractor {
    fn can_handle(&self, mime_type: &str) -> bool {
        mime_type.starts_with("application/pdf")
    }

    async fn extract(&self, data: &[u8]) -> Result<String> {
        if !has_pdf_header(data) {
            return Err(Error::InvalidInput(
                "not a valid PDF (missing %PDF header)".to_string(),
            ));
        }

        let pages = self.source.pages(data).await?;
        let total = pages.len();
        let mut content = String::new();
        let mut skipped = 0;

        for (idx, page) in pages.into_iter().enumerate() {
            match page {
                Ok(text) => {
                    content.push_str(&text);
                    content.push_str("\n\n");
                }
                Err(e) => {
                    skipped += 1;
                    warn!(page = idx + 1, error = %e, "Skipping unreadable PDF page");
                }
            }
        }

        if content.trim().is_empty() {
            return Err(Error::EmptyContent(format!(
                "no text content extracted from PDF ({} pages, {} skipped)",
                total, skipped
            )));
        }

        Ok(content)
    }

    fn name(&self) -> &str {
        "pdf"
    }

    async fn health_check(&self) -> Result<bool> {
        self.source.health_check().await
    }
}
