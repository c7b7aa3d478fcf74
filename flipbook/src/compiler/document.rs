//! The compiled flipbook.

use super::Hotspot;
use crate::core::StageFingerprint;
use crate::storage::StorageHandle;
use serde::{Deserialize, Serialize};

/// A self-contained interactive document.
///
/// Only the compiler constructs documents, and only from valid artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlipbookDocument {
    /// Fingerprint of the image artifact.
    pub image_fingerprint: StageFingerprint,
    /// Fingerprint of the story artifact.
    pub story_fingerprint: StageFingerprint,
    /// Hotspots embedded in the document.
    pub hotspots: Vec<Hotspot>,
    /// Rendered HTML.
    pub html: String,
    /// Hex SHA-256 of `html`.
    pub content_hash: String,
    /// Where the document was persisted, once stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageHandle>,
}

impl FlipbookDocument {
    /// Storage key derived from the content hash.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("flipbook/{}", self.content_hash)
    }

    /// The HTML as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.html.as_bytes()
    }

    /// Records where the document was persisted.
    #[must_use]
    pub fn with_storage(mut self, handle: StorageHandle) -> Self {
        self.storage = Some(handle);
        self
    }
}
