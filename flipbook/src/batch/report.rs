//! Aggregate batch results.

use crate::pipeline::{PipelineRun, RunFailure, RunOutcome};
use crate::utils::{duration_ms, Timestamp};
use uuid::Uuid;

/// Result of one batch index.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    /// Position in the batch (0-based).
    pub index: usize,
    /// The variation applied, if any.
    pub variation: Option<String>,
    /// Terminal result.
    pub outcome: RunOutcome,
    /// The finished run, absent if it never started or its task panicked.
    pub run: Option<PipelineRun>,
}

impl BatchEntry {
    pub(crate) fn from_run(index: usize, variation: Option<String>, run: PipelineRun) -> Self {
        Self {
            index,
            variation,
            outcome: run.outcome(),
            run: Some(run),
        }
    }

    pub(crate) fn failed(index: usize, variation: Option<String>, failure: RunFailure) -> Self {
        Self {
            index,
            variation,
            outcome: RunOutcome::Failed(failure),
            run: None,
        }
    }

    /// Returns true if the run reached `Done`.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self.outcome, RunOutcome::Done { .. })
    }
}

/// Outcome of a whole batch, entries sorted by index.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// The batch id.
    pub batch_id: Uuid,
    /// One entry per index, in index order.
    pub entries: Vec<BatchEntry>,
    /// When the batch started.
    pub started_at: Timestamp,
    /// When the last run finished.
    pub finished_at: Timestamp,
}

impl BatchReport {
    pub(crate) fn new(
        batch_id: Uuid,
        mut entries: Vec<BatchEntry>,
        started_at: Timestamp,
        finished_at: Timestamp,
    ) -> Self {
        entries.sort_by_key(|entry| entry.index);
        Self {
            batch_id,
            entries,
            started_at,
            finished_at,
        }
    }

    /// Number of runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the batch had no runs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs that reached `Done`.
    #[must_use]
    pub fn done_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_done()).count()
    }

    /// Runs that failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failures().len()
    }

    /// Runs that were cancelled.
    #[must_use]
    pub fn cancelled_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, RunOutcome::Cancelled { .. }))
            .count()
    }

    /// Failures with their batch index.
    #[must_use]
    pub fn failures(&self) -> Vec<(usize, &RunFailure)> {
        self.entries
            .iter()
            .filter_map(|entry| match &entry.outcome {
                RunOutcome::Failed(failure) => Some((entry.index, failure)),
                _ => None,
            })
            .collect()
    }

    /// The entry for `index`.
    #[must_use]
    pub fn entry(&self, index: usize) -> Option<&BatchEntry> {
        self.entries.iter().find(|entry| entry.index == index)
    }

    /// Wall-clock duration of the batch.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        duration_ms(self.started_at, self.finished_at)
    }

    /// A JSON summary for logs and the CLI.
    #[must_use]
    pub fn summary(&self) -> serde_json::Value {
        let runs: Vec<serde_json::Value> = self
            .entries
            .iter()
            .map(|entry| {
                let (state, detail) = match &entry.outcome {
                    RunOutcome::Done { document_handle } => ("done", document_handle.key.clone()),
                    RunOutcome::Failed(failure) => ("failed", failure.to_string()),
                    RunOutcome::Cancelled { reason } => ("cancelled", reason.clone()),
                };
                serde_json::json!({
                    "index": entry.index,
                    "variation": entry.variation,
                    "run_id": entry.run.as_ref().map(|r| r.id().to_string()),
                    "state": state,
                    "detail": detail,
                })
            })
            .collect();
        serde_json::json!({
            "batch_id": self.batch_id.to_string(),
            "done": self.done_count(),
            "failed": self.failed_count(),
            "cancelled": self.cancelled_count(),
            "duration_ms": self.duration_ms(),
            "runs": runs,
        })
    }
}
