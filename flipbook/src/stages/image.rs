//! Image stage adapter.

use super::{invoke_capability, GenerativeCapability, RawOutput, StageAdapter, DEFAULT_STAGE_TIMEOUT};
use crate::core::{Artifact, GenerationParameters, ImageArtifact, StageFingerprint, StageKind};
use crate::errors::StageError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Produces an [`ImageArtifact`] from an image capability.
#[derive(Debug, Clone)]
pub struct ImageStage {
    capability: Arc<dyn GenerativeCapability>,
    timeout: Duration,
}

impl ImageStage {
    /// Creates an image stage with the default timeout.
    #[must_use]
    pub fn new(capability: Arc<dyn GenerativeCapability>) -> Self {
        Self {
            capability,
            timeout: DEFAULT_STAGE_TIMEOUT,
        }
    }

    /// Sets the per-invocation timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl StageAdapter for ImageStage {
    fn kind(&self) -> StageKind {
        StageKind::Image
    }

    async fn generate(&self, params: &GenerationParameters) -> Result<Artifact, StageError> {
        self.validate(params)?;
        let fingerprint = StageFingerprint::compute(StageKind::Image, params);

        let raw = invoke_capability(StageKind::Image, self.capability.as_ref(), params, self.timeout)
            .await?;

        match raw {
            RawOutput::Image {
                media_type,
                bytes,
                width,
                height,
            } => {
                if bytes.is_empty() {
                    return Err(StageError::invalid_output(StageKind::Image, "image payload is empty"));
                }
                if media_type.trim().is_empty() {
                    return Err(StageError::invalid_output(StageKind::Image, "media type is empty"));
                }
                Ok(ImageArtifact::new(fingerprint, media_type, bytes)
                    .with_dimensions(width, height)
                    .into())
            }
            RawOutput::Text(_) => Err(StageError::invalid_output(
                StageKind::Image,
                "expected image output, got text",
            )),
        }
    }
}
