//! Typed stage artifacts.

use super::{StageFingerprint, StageKind};
use crate::storage::StorageHandle;
use crate::utils::{now_utc, Timestamp};
use serde::{Deserialize, Serialize};

/// Provenance and validity shared by every artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// The stage that produced the artifact.
    pub stage: StageKind,
    /// Fingerprint of the producing invocation.
    pub fingerprint: StageFingerprint,
    /// When the artifact was created.
    pub created_at: Timestamp,
    /// Whether the artifact passed output validation.
    pub valid: bool,
    /// Where the payload was persisted, once the cache has stored it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageHandle>,
}

impl ArtifactMeta {
    /// Creates metadata for a freshly produced, valid artifact.
    #[must_use]
    pub fn new(stage: StageKind, fingerprint: StageFingerprint) -> Self {
        Self {
            stage,
            fingerprint,
            created_at: now_utc(),
            valid: true,
            storage: None,
        }
    }
}

/// Output of the image stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageArtifact {
    /// Provenance.
    pub meta: ArtifactMeta,
    /// MIME type of the payload (e.g. `image/png`).
    pub media_type: String,
    /// Pixel width, when reported by the capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Pixel height, when reported by the capability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Encoded image bytes.
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

impl ImageArtifact {
    /// Creates a valid image artifact.
    #[must_use]
    pub fn new(fingerprint: StageFingerprint, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            meta: ArtifactMeta::new(StageKind::Image, fingerprint),
            media_type: media_type.into(),
            width: None,
            height: None,
            bytes,
        }
    }

    /// Records the pixel dimensions.
    #[must_use]
    pub const fn with_dimensions(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// Output of the text (story) stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextArtifact {
    /// Provenance.
    pub meta: ArtifactMeta,
    /// The story text.
    pub body: String,
    /// Length in whitespace-separated words.
    pub units: usize,
    /// Whether the body was cut to the requested length.
    #[serde(default)]
    pub truncated: bool,
}

impl TextArtifact {
    /// Creates a valid text artifact, counting its units.
    #[must_use]
    pub fn new(fingerprint: StageFingerprint, body: impl Into<String>) -> Self {
        let body = body.into();
        let units = body.split_whitespace().count();
        Self {
            meta: ArtifactMeta::new(StageKind::Text, fingerprint),
            body,
            units,
            truncated: false,
        }
    }
}

/// A validated, typed output of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    /// An image.
    Image(ImageArtifact),
    /// A story.
    Text(TextArtifact),
}

impl Artifact {
    /// The stage kind of the payload.
    #[must_use]
    pub const fn kind(&self) -> StageKind {
        match self {
            Self::Image(_) => StageKind::Image,
            Self::Text(_) => StageKind::Text,
        }
    }

    /// Provenance metadata.
    #[must_use]
    pub const fn meta(&self) -> &ArtifactMeta {
        match self {
            Self::Image(image) => &image.meta,
            Self::Text(text) => &text.meta,
        }
    }

    fn meta_mut(&mut self) -> &mut ArtifactMeta {
        match self {
            Self::Image(image) => &mut image.meta,
            Self::Text(text) => &mut text.meta,
        }
    }

    /// The producing fingerprint.
    #[must_use]
    pub const fn fingerprint(&self) -> &StageFingerprint {
        &self.meta().fingerprint
    }

    /// Whether the artifact passed validation.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.meta().valid
    }

    /// The payload bytes as they are persisted.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Image(image) => &image.bytes,
            Self::Text(text) => text.body.as_bytes(),
        }
    }

    /// Size of the payload in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.payload().len() as u64
    }

    /// Returns the image payload, if this is an image.
    #[must_use]
    pub const fn as_image(&self) -> Option<&ImageArtifact> {
        match self {
            Self::Image(image) => Some(image),
            Self::Text(_) => None,
        }
    }

    /// Returns the text payload, if this is a story.
    #[must_use]
    pub const fn as_text(&self) -> Option<&TextArtifact> {
        match self {
            Self::Text(text) => Some(text),
            Self::Image(_) => None,
        }
    }

    /// Records where the payload was persisted.
    #[must_use]
    pub fn with_storage(mut self, handle: StorageHandle) -> Self {
        self.meta_mut().storage = Some(handle);
        self
    }

    /// Marks the artifact invalid.
    #[must_use]
    pub fn invalidated(mut self) -> Self {
        self.meta_mut().valid = false;
        self
    }
}

impl From<ImageArtifact> for Artifact {
    fn from(image: ImageArtifact) -> Self {
        Self::Image(image)
    }
}

impl From<TextArtifact> for Artifact {
    fn from(text: TextArtifact) -> Self {
        Self::Text(text)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
