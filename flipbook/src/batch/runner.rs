//! Bounded-parallelism batch execution.

use super::{BatchConfig, BatchEntry, BatchJob, BatchReport, BatchRequest};
use crate::cancellation::CancellationToken;
use crate::observability::SpanTimer;
use crate::pipeline::{PipelineOrchestrator, RunFailure};
use crate::utils::now_utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// Drives the orchestrator over every run of a batch.
///
/// Runs share the orchestrator's cache, so identical variations are
/// computed once.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    orchestrator: PipelineOrchestrator,
    config: BatchConfig,
}

impl BatchRunner {
    /// Creates a runner.
    #[must_use]
    pub const fn new(orchestrator: PipelineOrchestrator, config: BatchConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// The runner settings.
    #[must_use]
    pub const fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Plans `request` with this runner's variations and seed.
    #[must_use]
    pub fn plan(&self, request: &BatchRequest) -> BatchJob {
        BatchJob::plan(request, &self.config)
    }

    /// Plans and executes a batch.
    pub async fn run(&self, request: BatchRequest) -> BatchReport {
        self.run_job(self.plan(&request), &CancellationToken::new())
            .await
    }

    /// Plans and executes a batch; cancelling `token` cancels every run that
    /// has not started compiling.
    pub async fn run_with_cancellation(
        &self,
        request: BatchRequest,
        token: &CancellationToken,
    ) -> BatchReport {
        self.run_job(self.plan(&request), token).await
    }

    /// Executes a planned batch.
    ///
    /// A failed or panicked run is recorded at its index; the others continue.
    pub async fn run_job(&self, job: BatchJob, token: &CancellationToken) -> BatchReport {
        let timer = SpanTimer::start("flipbook.batch");
        let started_at = now_utc();
        let batch_id = job.id();
        let parallelism = self.config.parallelism.max(1);
        info!(
            batch_id = %batch_id,
            runs = job.len(),
            parallelism,
            "Starting batch"
        );

        let semaphore = Arc::new(Semaphore::new(parallelism));
        let mut entries = Vec::with_capacity(job.len());
        let mut tasks = FuturesUnordered::new();

        for planned in job.into_runs() {
            let request = match planned.request {
                Ok(request) => request,
                Err(err) => {
                    warn!(batch_id = %batch_id, index = planned.index, error = %err, "Invalid batch run");
                    entries.push(BatchEntry::failed(
                        planned.index,
                        planned.variation,
                        RunFailure::invalid_request(&err),
                    ));
                    continue;
                }
            };

            let orchestrator = self.orchestrator.clone();
            let semaphore = Arc::clone(&semaphore);
            let token = token.clone();
            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so acquiring only waits.
                let _permit = semaphore.acquire_owned().await.ok();
                orchestrator.run_with_cancellation(request, &token).await
            });

            let index = planned.index;
            let variation = planned.variation;
            tasks.push(async move { (index, variation, handle.await) });
        }

        while let Some((index, variation, joined)) = tasks.next().await {
            let entry = match joined {
                Ok(run) => BatchEntry::from_run(index, variation, run),
                Err(err) => {
                    error!(batch_id = %batch_id, index, error = %err, "Batch run task failed");
                    BatchEntry::failed(
                        index,
                        variation,
                        RunFailure::internal(format!("run task failed: {err}")),
                    )
                }
            };
            entries.push(entry);
        }

        let report = BatchReport::new(batch_id, entries, started_at, now_utc());
        let duration_ms = timer.finish();
        info!(
            batch_id = %batch_id,
            done = report.done_count(),
            failed = report.failed_count(),
            cancelled = report.cancelled_count(),
            duration_ms,
            "Batch finished"
        );
        report
    }
}
