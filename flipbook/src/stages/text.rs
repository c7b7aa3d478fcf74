//! Text (story) stage adapter.

use super::{invoke_capability, GenerativeCapability, RawOutput, StageAdapter, DEFAULT_STAGE_TIMEOUT};
use crate::core::{Artifact, GenerationParameters, StageFingerprint, StageKind, TextArtifact};
use crate::errors::{InvalidParameterError, StageError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Largest `max_output_units` the text stage accepts by default.
pub const DEFAULT_MAX_TEXT_UNITS: u32 = 1024;

/// Produces a [`TextArtifact`] from a language capability.
///
/// Output longer than `max_output_units` words is cut to that many words and
/// flagged as truncated.
#[derive(Debug, Clone)]
pub struct TextStage {
    capability: Arc<dyn GenerativeCapability>,
    timeout: Duration,
    max_units_cap: u32,
}

impl TextStage {
    /// Creates a text stage with default timeout and unit cap.
    #[must_use]
    pub fn new(capability: Arc<dyn GenerativeCapability>) -> Self {
        Self {
            capability,
            timeout: DEFAULT_STAGE_TIMEOUT,
            max_units_cap: DEFAULT_MAX_TEXT_UNITS,
        }
    }

    /// Sets the per-invocation timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the largest accepted `max_output_units`.
    #[must_use]
    pub const fn with_max_units_cap(mut self, cap: u32) -> Self {
        self.max_units_cap = cap;
        self
    }
}

#[async_trait]
impl StageAdapter for TextStage {
    fn kind(&self) -> StageKind {
        StageKind::Text
    }

    fn validate(&self, params: &GenerationParameters) -> Result<(), StageError> {
        if params.max_output_units() > self.max_units_cap {
            return Err(InvalidParameterError::new(
                "max_output_units",
                format!(
                    "must be at most {} for the text stage, got {}",
                    self.max_units_cap,
                    params.max_output_units()
                ),
            )
            .into());
        }
        Ok(())
    }

    async fn generate(&self, params: &GenerationParameters) -> Result<Artifact, StageError> {
        self.validate(params)?;
        let fingerprint = StageFingerprint::compute(StageKind::Text, params);

        let raw = invoke_capability(StageKind::Text, self.capability.as_ref(), params, self.timeout)
            .await?;

        let RawOutput::Text(body) = raw else {
            return Err(StageError::invalid_output(
                StageKind::Text,
                "expected text output, got image",
            ));
        };

        let body = body.trim();
        if body.is_empty() {
            return Err(StageError::invalid_output(StageKind::Text, "story text is empty"));
        }

        let limit = params.max_output_units() as usize;
        let mut artifact = TextArtifact::new(fingerprint, body);
        if artifact.units > limit {
            tracing::debug!(units = artifact.units, limit, "Truncating story output");
            artifact.body = body.split_whitespace().take(limit).collect::<Vec<_>>().join(" ");
            artifact.units = limit;
            artifact.truncated = true;
        }

        Ok(artifact.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::testing::{duck_params, ScriptedCapability};

    fn stage_returning(body: &str) -> (TextStage, Arc<ScriptedCapability>) {
        let capability = Arc::new(ScriptedCapability::always(RawOutput::text(body)));
        (TextStage::new(capability.clone()), capability)
    }

    #[tokio::test]
    async fn test_generate_story() {
        let (stage, capability) = stage_returning("  Once upon a time  ");

        let artifact = stage.generate(&duck_params()).await.unwrap();
        let text = artifact.as_text().unwrap();

        assert_eq!(text.body, "Once upon a time");
        assert_eq!(text.units, 4);
        assert!(!text.truncated);
        assert_eq!(capability.calls(), 1);
    }

    #[tokio::test]
    async fn test_long_output_truncated_and_flagged() {
        let (stage, _) = stage_returning("one two three four five six");
        let params = duck_params().to_builder().max_output_units(3).build().unwrap();

        let artifact = stage.generate(&params).await.unwrap();
        let text = artifact.as_text().unwrap();

        assert_eq!(text.body, "one two three");
        assert_eq!(text.units, 3);
        assert!(text.truncated);
    }

    #[tokio::test]
    async fn test_whitespace_only_output_is_invalid() {
        let (stage, _) = stage_returning(" \n\t ");

        let err = stage.generate(&duck_params()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOutput);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_units_above_cap_rejected_before_invoking() {
        let (stage, capability) = stage_returning("story");
        let stage = stage.with_max_units_cap(100);

        let err = stage.generate(&duck_params()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert_eq!(capability.calls(), 0);
    }

    #[tokio::test]
    async fn test_image_output_is_invalid() {
        let capability = Arc::new(ScriptedCapability::always(RawOutput::image(
            "image/png",
            vec![1],
        )));
        let stage = TextStage::new(capability);

        let err = stage.generate(&duck_params()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOutput);
    }
}
