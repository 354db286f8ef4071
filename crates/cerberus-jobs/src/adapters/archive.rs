//! ZIP archive extractor dispatching each member back through a registry.

use std::io::{Cursor, Read};
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};
use zip::ZipArchive;

use cerberus_core::defaults::{ARCHIVE_MAX_ENTRIES, ARCHIVE_MAX_ENTRY_BYTES};
use cerberus_core::text::strip_control_chars;
use cerberus_core::{Error, Extractor, Result};

use crate::extraction::ExtractorRegistry;

const ZIP_TYPES: &[&str] = &["application/zip", "application/x-zip-compressed", "application/x-zip"];

/// A regular file read out of the archive.
#[derive(Debug)]
struct Member {
    name: String,
    data: std::result::Result<Vec<u8>, String>,
}

/// Media type for an archive member, by extension first, then by sniffing.
pub fn member_media_type(name: &str, data: &[u8]) -> String {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let by_ext = match ext.as_deref() {
        Some("txt") => Some("text/plain"),
        Some("md") => Some("text/markdown"),
        Some("csv") => Some("text/csv"),
        Some("json") => Some("application/json"),
        Some("xml") => Some("application/xml"),
        Some("html" | "htm") => Some("text/html"),
        Some("pdf") => Some("application/pdf"),
        Some("xlsx") => Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        Some("xls") => Some("application/vnd.ms-excel"),
        Some("ods") => Some("application/vnd.oasis.opendocument.spreadsheet"),
        Some("eml") => Some("message/rfc822"),
        Some("msg") => Some("application/vnd.ms-outlook"),
        Some("zip") => Some("application/zip"),
        _ => None,
    };

    by_ext
        .map(str::to_string)
        .or_else(|| infer::get(data).map(|kind| kind.mime_type().to_string()))
        .unwrap_or_else(|| "text/plain".to_string())
}

fn read_members(data: &[u8]) -> Result<Vec<Member>> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| Error::InvalidInput(format!("failed to open ZIP archive: {}", e)))?;

    if archive.len() > ARCHIVE_MAX_ENTRIES {
        warn!(
            entries = archive.len(),
            limit = ARCHIVE_MAX_ENTRIES,
            "ZIP archive truncated to entry limit"
        );
    }

    let mut members = Vec::new();
    for index in 0..archive.len().min(ARCHIVE_MAX_ENTRIES) {
        let mut file = match archive.by_index(index) {
            Ok(file) => file,
            Err(e) => {
                members.push(Member {
                    name: format!("entry {}", index),
                    data: Err(format!("could not open entry: {}", e)),
                });
                continue;
            }
        };
        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let mut buf = Vec::new();
        let data = match file.by_ref().take(ARCHIVE_MAX_ENTRY_BYTES).read_to_end(&mut buf) {
            Ok(_) if buf.is_empty() => continue,
            Ok(_) => Ok(buf),
            Err(e) => Err(format!("could not read file: {}", e)),
        };
        members.push(Member { name, data });
    }
    Ok(members)
}

/// Extracts every regular file in a ZIP archive and concatenates the text
/// under per-file headers.
///
/// Members go through `inner`, a registry that does not contain this
/// extractor, so nested archives are listed rather than unpacked. A member
/// no extractor accepts is included as text when it decodes as UTF-8 and
/// noted as binary otherwise. Per-member failures are noted inline and
/// never fail the archive.
pub struct ZipExtractor {
    inner: ExtractorRegistry,
}

impl ZipExtractor {
    pub fn new(inner: ExtractorRegistry) -> Self {
        Self { inner }
    }

    async fn member_text(&self, member: &Member) -> String {
        let data = match &member.data {
            Ok(data) => data,
            Err(e) => return format!("[Error: {}]", e),
        };

        let media_type = member_media_type(&member.name, data);
        if self.inner.can_extract(&media_type) {
            return match self.inner.extract(&media_type, data).await {
                Ok(text) => text,
                Err(e) => {
                    debug!(member = %member.name, media_type, error = %e, "Archive member extraction failed");
                    format!("[Error: could not extract text from {}: {}]", member.name, e)
                }
            };
        }

        match std::str::from_utf8(data) {
            Ok(text) => text.to_string(),
            Err(_) => format!("[Binary file, no extractor for {}]", media_type),
        }
    }
}

#[async_trait]
impl Extractor for ZipExtractor {
    fn can_handle(&self, mime_type: &str) -> bool {
        ZIP_TYPES.iter().any(|t| mime_type.starts_with(t))
    }

    async fn extract(&self, data: &[u8]) -> Result<String> {
        let bytes = data.to_vec();
        let members = tokio::task::spawn_blocking(move || read_members(&bytes))
            .await
            .map_err(|e| Error::Internal(format!("archive read task failed: {}", e)))??;

        if members.is_empty() {
            return Err(Error::EmptyContent(
                "no extractable files found in ZIP archive".to_string(),
            ));
        }

        let mut sections = Vec::with_capacity(members.len());
        for member in &members {
            let text = self.member_text(member).await;
            sections.push(format!("--- File: {} ---\n{}\n", member.name, text.trim()));
        }

        let out = format!(
            "ZIP archive contents ({} files):\n\n{}",
            members.len(),
            sections.join("\n")
        );
        Ok(strip_control_chars(&out))
    }

    fn name(&self) -> &str {
        "zip"
    }
}
