//! In-memory artifact store.

use super::{validate_key, ArtifactStore, StorageHandle};
use crate::errors::StorageError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Artifact store backed by a concurrent map.
///
/// Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifactStore {
    entries: Arc<DashMap<String, Arc<[u8]>>>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<StorageHandle, StorageError> {
        validate_key(key)?;
        self.entries.insert(key.to_string(), Arc::from(bytes));
        Ok(StorageHandle::for_bytes(key, self.backend(), bytes))
    }

    async fn get(&self, handle: &StorageHandle) -> Result<Vec<u8>, StorageError> {
        let bytes = self
            .entries
            .get(&handle.key)
            .map(|entry| entry.value().to_vec())
            .ok_or_else(|| StorageError::NotFound(handle.key.clone()))?;
        handle.verify(&bytes)?;
        Ok(bytes)
    }

    async fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.contains_key(key))
    }
}
