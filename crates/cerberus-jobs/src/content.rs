//! Filesystem-backed artifact content store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use cerberus_core::defaults::ARTIFACT_STORAGE_PATH;
use cerberus_core::{Artifact, ContentStore, Error, Result};

/// Reads artifact bytes from `<root>/<file id>`.
///
/// The file ID is the last segment of `storage_path`, so upload
/// collaborators may store either a bare ID or a URL-like handle.
#[derive(Debug, Clone)]
pub struct FilesystemContentStore {
    root: PathBuf,
}

impl FilesystemContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from `ARTIFACT_STORAGE_PATH` (default `/var/lib/cerberus/artifacts`).
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("ARTIFACT_STORAGE_PATH")
                .unwrap_or_else(|_| ARTIFACT_STORAGE_PATH.to_string()),
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage handle to a path inside the root.
    pub fn resolve(&self, storage_path: &str) -> Result<PathBuf> {
        let file_id = storage_path
            .trim_end_matches('/')
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or("");

        if file_id.is_empty() || file_id == "." || file_id == ".." {
            return Err(Error::InvalidInput(format!(
                "invalid storage path: {:?}",
                storage_path
            )));
        }
        Ok(self.root.join(file_id))
    }
}

#[async_trait]
impl ContentStore for FilesystemContentStore {
    async fn fetch(&self, artifact: &Artifact) -> Result<Vec<u8>> {
        let path = self.resolve(&artifact.storage_path)?;
        debug!(artifact_id = %artifact.artifact_id, path = %path.display(), "Reading artifact content");
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(format!(
                "content for artifact {} not found at {}",
                artifact.artifact_id,
                path.display()
            )),
            _ => Error::Io(e),
        })
    }
}
