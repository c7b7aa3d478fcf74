//! Filesystem artifact store.

use super::{validate_key, ArtifactStore, StorageHandle};
use crate::errors::StorageError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Artifact store rooted at a directory.
///
/// Keys map to relative paths under the root (`artifact/<fp>` becomes
/// `<root>/artifact/<fp>`). Writes go to a temp file in the same directory
/// and are renamed into place, so readers never observe partial payloads.
#[derive(Debug, Clone)]
pub struct FileSystemArtifactStore {
    root: PathBuf,
}

impl FileSystemArtifactStore {
    /// Creates a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            StorageError::backend(
                root.display().to_string(),
                format!("failed to create root directory: {e}"),
            )
        })?;
        Ok(Self { root })
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for a key.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }
}

#[async_trait]
impl ArtifactStore for FileSystemArtifactStore {
    fn backend(&self) -> &'static str {
        "filesystem"
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<StorageHandle, StorageError> {
        let path = self.path_for(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::backend(key, format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, bytes).await.map_err(|e| {
            StorageError::backend(key, format!("failed to write {}: {e}", temp_path.display()))
        })?;

        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StorageError::backend(
                key,
                format!("failed to rename into {}: {e}", path.display()),
            ));
        }

        tracing::debug!(key, path = %path.display(), size = bytes.len(), "Stored payload");

        Ok(StorageHandle::for_bytes(key, self.backend(), bytes))
    }

    async fn get(&self, handle: &StorageHandle) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(&handle.key)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(handle.key.clone())
            } else {
                StorageError::backend(&handle.key, format!("failed to read {}: {e}", path.display()))
            }
        })?;
        handle.verify(&bytes)?;
        Ok(bytes)
    }

    async fn contains(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::backend(key, e.to_string()))
    }
}
