//! Stage adapters.
//!
//! A stage adapter wraps one [`GenerativeCapability`] behind a uniform
//! interface: it validates stage-specific parameters, invokes the capability
//! exactly once per call, and returns a typed [`Artifact`] or a typed
//! [`StageError`]. Adapters never touch storage and never retry; both are
//! the orchestrator's concern.

mod capability;
mod image;
mod placeholder;
mod safety;
mod text;

pub use capability::{CapabilityError, GenerativeCapability, RawOutput};
pub use image::ImageStage;
pub use placeholder::{PlaceholderImageCapability, PlaceholderStoryCapability};
pub use safety::{ContentSafetyHook, KeywordSafetyFilter, RejectedContent};
pub use text::{TextStage, DEFAULT_MAX_TEXT_UNITS};

use crate::core::{Artifact, GenerationParameters, StageKind};
use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

/// Default per-invocation time budget for a capability.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Uniform wrapper around one generative capability.
#[async_trait]
pub trait StageAdapter: Send + Sync + Debug {
    /// The stage kind this adapter produces.
    fn kind(&self) -> StageKind;

    /// Stage-specific parameter checks, run before any capability call.
    fn validate(&self, _params: &GenerationParameters) -> Result<(), StageError> {
        Ok(())
    }

    /// Invokes the capability once and validates its output.
    async fn generate(&self, params: &GenerationParameters) -> Result<Artifact, StageError>;
}

/// Invokes `capability` under `timeout`, mapping failures onto [`StageError`].
pub(crate) async fn invoke_capability(
    stage: StageKind,
    capability: &dyn GenerativeCapability,
    params: &GenerationParameters,
    timeout: Duration,
) -> Result<RawOutput, StageError> {
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

    tracing::debug!(
        stage = %stage,
        capability = capability.name(),
        timeout_ms,
        "Invoking capability"
    );

    let numeric = params.numeric();
    let invocation = capability.invoke(params.prompt_text(), &numeric);
    match tokio::time::timeout(timeout, invocation).await {
        Ok(Ok(raw)) => Ok(raw),
        Ok(Err(CapabilityError::Unavailable(reason))) => {
            Err(StageError::unavailable(stage, reason))
        }
        Ok(Err(CapabilityError::TimedOut)) | Err(_) => {
            Err(StageError::GenerationTimeout { stage, timeout_ms })
        }
        Ok(Err(CapabilityError::Failed(reason))) => Err(StageError::invalid_output(stage, reason)),
    }
}
