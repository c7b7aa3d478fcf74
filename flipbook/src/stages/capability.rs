//! The generative capability boundary.
//!
//! A capability is the opaque model behind a stage: it takes a prompt plus
//! numeric knobs and returns raw output. Everything else (validation,
//! fingerprinting, timeouts) is the adapter's job.

use crate::core::NumericParams;
use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Raw, unvalidated output of a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawOutput {
    /// Encoded image.
    Image {
        /// MIME type of `bytes`.
        media_type: String,
        /// Encoded image bytes.
        bytes: Vec<u8>,
        /// Pixel width, if known.
        width: Option<u32>,
        /// Pixel height, if known.
        height: Option<u32>,
    },
    /// Generated text.
    Text(String),
}

impl RawOutput {
    /// Convenience constructor for an image without dimensions.
    #[must_use]
    pub fn image(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::Image {
            media_type: media_type.into(),
            bytes,
            width: None,
            height: None,
        }
    }

    /// Convenience constructor for text.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text(body.into())
    }
}

/// Failure reported by a capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// The model or resource is not loaded.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The capability gave up on its own deadline.
    #[error("timed out")]
    TimedOut,

    /// The capability failed to produce usable output.
    #[error("failed: {0}")]
    Failed(String),
}

/// A generative model wrapped by a stage adapter.
#[async_trait]
pub trait GenerativeCapability: Send + Sync + Debug {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Generates output for `prompt`.
    async fn invoke(
        &self,
        prompt: &str,
        params: &NumericParams,
    ) -> Result<RawOutput, CapabilityError>;
}
