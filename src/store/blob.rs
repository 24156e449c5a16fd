//! Blob storage for user-uploaded media.
//!
//! Objects are addressed by slash-separated paths relative to a bucket root.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::StorageError;

/// Object store seam. The filesystem bucket is the only backend today.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` at `path`, replacing any existing object.
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError>;
}

/// Bucket directory on the local filesystem.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an object path under the root, rejecting anything that could
    /// escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        if path.is_empty() {
            return Err(StorageError::InvalidPath("empty object path".into()));
        }
        for component in relative.components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(StorageError::InvalidPath(path.to_string()));
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::UploadFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                })?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|e| StorageError::UploadFailed {
                path: path.to_string(),
                reason: e.to_string(),
            })?;

        debug!(path, content_type, size = bytes.len(), "Blob stored");
        Ok(())
    }
}
