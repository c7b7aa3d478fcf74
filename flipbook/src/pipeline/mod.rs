//! Pipeline orchestration.
//!
//! This module provides:
//! - Run requests and the finished [`PipelineRun`] record
//! - The [`PipelineOrchestrator`] state machine
//! - Retry policy for transient stage failures

mod orchestrator;
mod retry;
mod run;

#[cfg(test)]
mod integration_tests;

pub use orchestrator::{PipelineOrchestrator, PipelineOrchestratorBuilder};
pub use retry::{
    should_retry, with_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision,
    RetryOutcome, Retryable,
};
pub use run::{
    CacheManifest, FailureOrigin, ManifestEntry, PipelineRun, RunFailure, RunOutcome, RunRequest,
    StageRecord, StateTransition,
};
