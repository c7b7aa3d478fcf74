//! Storage boundary for artifacts and compiled documents.
//!
//! Stages never touch storage. The cache persists fresh artifact payloads
//! and the orchestrator persists compiled documents through an
//! [`ArtifactStore`].

mod filesystem;
mod memory;

pub use filesystem::FileSystemArtifactStore;
pub use memory::InMemoryArtifactStore;

use crate::core::hash_hex;
use crate::errors::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Reference to bytes persisted by an [`ArtifactStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageHandle {
    /// Logical key (e.g. `artifact/<fingerprint>` or `flipbook/<hash>`).
    pub key: String,
    /// Name of the backend that holds the bytes.
    pub backend: String,
    /// Stored size in bytes.
    pub size_bytes: u64,
    /// Hex SHA-256 of the stored bytes.
    pub content_hash: String,
}

impl StorageHandle {
    /// Creates a handle for `bytes` stored under `key`.
    #[must_use]
    pub fn for_bytes(key: impl Into<String>, backend: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            key: key.into(),
            backend: backend.into(),
            size_bytes: bytes.len() as u64,
            content_hash: hash_hex(bytes),
        }
    }

    /// Fails with [`StorageError::HashMismatch`] if `bytes` differ from what was stored.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let actual = hash_hex(bytes);
        if actual == self.content_hash {
            Ok(())
        } else {
            Err(StorageError::HashMismatch {
                key: self.key.clone(),
                expected: self.content_hash.clone(),
                actual,
            })
        }
    }
}

/// Key-value storage for persisted payloads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Short backend name recorded in handles.
    fn backend(&self) -> &'static str;

    /// Stores `bytes` under `key`, replacing any previous value.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<StorageHandle, StorageError>;

    /// Reads the bytes a handle refers to, verifying their hash.
    async fn get(&self, handle: &StorageHandle) -> Result<Vec<u8>, StorageError>;

    /// Returns true if something is stored under `key`.
    async fn contains(&self, key: &str) -> Result<bool, StorageError>;
}

/// Rejects keys that are empty, absolute, or escape the store root.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let reason = if key.trim().is_empty() {
        Some("key must not be empty")
    } else if key.starts_with('/') || key.contains('\\') {
        Some("key must be a relative path with '/' separators")
    } else if key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
        Some("key segments must be non-empty and must not be '.' or '..'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("artifact/abc").is_ok());
        assert!(validate_key("flipbook/0123").is_ok());

        for bad in ["", "  ", "/etc/passwd", "a/../b", "a//b", "./a", "a\\b"] {
            assert!(
                matches!(validate_key(bad), Err(StorageError::InvalidKey { .. })),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_handle_verify() {
        let handle = StorageHandle::for_bytes("k", "memory", b"hello");
        assert_eq!(handle.size_bytes, 5);
        assert!(handle.verify(b"hello").is_ok());
        assert!(matches!(
            handle.verify(b"HELLO"),
            Err(StorageError::HashMismatch { .. })
        ));
    }
}
