//! Test assertions for pipeline runs.

use crate::core::{RunState, StageKind, StageStatus};
use crate::cache::CacheOutcome;
use crate::pipeline::PipelineRun;

/// Asserts that the run finished `Done` with a stored document.
pub fn assert_run_done(run: &PipelineRun) {
    assert_eq!(
        run.state(),
        RunState::Done,
        "Expected DONE, got {} (failure: {:?})",
        run.state(),
        run.failure()
    );
    assert!(run.document().is_some(), "Done run has no document");
}

/// Asserts that the run finished `Failed` without a document.
pub fn assert_run_failed(run: &PipelineRun) {
    assert_eq!(run.state(), RunState::Failed, "Expected FAILED, got {}", run.state());
    assert!(run.failure().is_some(), "Failed run carries no failure");
    assert!(run.document().is_none(), "Failed run produced a document");
}

/// Asserts the exact sequence of states the run passed through.
pub fn assert_state_sequence(run: &PipelineRun, expected: &[RunState]) {
    assert_eq!(
        run.state_history(),
        expected,
        "Unexpected state sequence"
    );
}

/// Asserts a stage's final status.
pub fn assert_stage_status(run: &PipelineRun, stage: StageKind, expected: StageStatus) {
    let record = run.stage(stage);
    assert_eq!(
        record.status, expected,
        "Expected {stage} stage {expected}, got {}",
        record.status
    );
}

/// Asserts how a stage's artifact was obtained from the cache.
pub fn assert_cache_outcome(run: &PipelineRun, stage: StageKind, expected: CacheOutcome) {
    assert_eq!(
        run.stage(stage).cache_outcome,
        Some(expected),
        "Unexpected cache outcome for {stage} stage"
    );
}
