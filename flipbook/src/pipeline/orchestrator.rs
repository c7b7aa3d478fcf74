//! The pipeline orchestrator.
//!
//! One run moves through `Pending -> Generating -> Compiling -> Done`. Both
//! stages are polled concurrently while the run is `Generating`; each goes
//! through the artifact cache, so a stage whose fingerprint is cached or
//! already in flight never reaches its capability. Transient stage failures
//! are retried inside the cached computation, which means joined waiters see
//! the retried result rather than starting their own retries.

use super::retry::{with_retry, RetryConfig};
use super::run::{PipelineRun, RunFailure, RunRequest};
use crate::cache::{ArtifactCache, CacheLookup, CachePolicy};
use crate::cancellation::CancellationToken;
use crate::compiler::{FlipbookCompiler, FlipbookDocument};
use crate::config::FlipbookConfig;
use crate::core::{
    Artifact, GenerationParameters, RunState, StageFingerprint, StageKind, StageStatus,
};
use crate::errors::{FlipbookError, StageError};
use crate::events::{
    EventSink, NoOpEventSink, RUN_FINISHED, RUN_STARTED, RUN_STATE_CHANGED, STAGE_COMPLETED,
    STAGE_FAILED,
};
use crate::observability::SpanTimer;
use crate::stages::{
    ContentSafetyHook, GenerativeCapability, ImageStage, KeywordSafetyFilter, StageAdapter,
    TextStage,
};
use crate::storage::{ArtifactStore, InMemoryArtifactStore};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of driving one stage through the cache.
struct StageRun {
    kind: StageKind,
    fingerprint: StageFingerprint,
    result: Result<CacheLookup, StageError>,
    attempts: u32,
    duration_ms: f64,
}

/// Sequences the stage adapters, the cache, and the compiler.
///
/// Cloning is cheap; clones share the cache and collaborators.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    image: Arc<dyn StageAdapter>,
    text: Arc<dyn StageAdapter>,
    cache: ArtifactCache,
    store: Arc<dyn ArtifactStore>,
    retry: RetryConfig,
    events: Arc<dyn EventSink>,
    safety: Option<Arc<dyn ContentSafetyHook>>,
    compiler: FlipbookCompiler,
}

impl PipelineOrchestrator {
    /// Starts a builder around the two stage adapters.
    #[must_use]
    pub fn builder(
        image: Arc<dyn StageAdapter>,
        text: Arc<dyn StageAdapter>,
    ) -> PipelineOrchestratorBuilder {
        PipelineOrchestratorBuilder::new(image, text)
    }

    /// Starts a builder with stages, cache, retry, compiler, and safety
    /// filter configured from `config`.
    pub fn from_config(
        config: &FlipbookConfig,
        image: Arc<dyn GenerativeCapability>,
        text: Arc<dyn GenerativeCapability>,
    ) -> Result<PipelineOrchestratorBuilder, FlipbookError> {
        let image_stage = ImageStage::new(image).with_timeout(config.stages.image_timeout());
        let text_stage = TextStage::new(text)
            .with_timeout(config.stages.text_timeout())
            .with_max_units_cap(config.stages.max_text_units);

        let mut builder = Self::builder(Arc::new(image_stage), Arc::new(text_stage))
            .cache(ArtifactCache::new(config.cache.clone()))
            .retry(config.retry.clone())
            .compiler(FlipbookCompiler::new(config.compiler.clone()));

        if !config.stages.blocked_terms.is_empty() {
            let filter = KeywordSafetyFilter::new(&config.stages.blocked_terms).map_err(|e| {
                crate::config::ConfigError::InvalidValue {
                    key: "stages.blocked_terms".to_string(),
                    reason: e.to_string(),
                }
            })?;
            builder = builder.safety_hook(Arc::new(filter));
        }
        Ok(builder)
    }

    /// The shared artifact cache.
    #[must_use]
    pub const fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// The document store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Executes one run to a terminal state.
    pub async fn run(&self, request: RunRequest) -> PipelineRun {
        self.run_with_cancellation(request, &CancellationToken::new())
            .await
    }

    /// Executes one run, stopping early if `token` is cancelled before the
    /// run starts compiling.
    pub async fn run_with_cancellation(
        &self,
        request: RunRequest,
        token: &CancellationToken,
    ) -> PipelineRun {
        let timer = SpanTimer::start("flipbook.run");
        let mut run = PipelineRun::new(request);
        let run_id = run.id();

        info!(
            run_id = %run_id,
            image_fingerprint = run.stage(StageKind::Image).fingerprint.short(),
            text_fingerprint = run.stage(StageKind::Text).fingerprint.short(),
            "Starting flipbook run"
        );
        self.events
            .emit(
                RUN_STARTED,
                Some(serde_json::json!({
                    "run_id": run_id.to_string(),
                    "image_prompt": run.request().image_params().prompt_text(),
                    "story_prompt": run.request().story_params().prompt_text(),
                    "cache_policy": run.request().cache_policy(),
                })),
            )
            .await;

        if let Err(err) = self.execute(&mut run, token).await {
            error!(run_id = %run_id, error = %err, "Run aborted by orchestration error");
            run.abort(RunFailure::internal(err.to_string()));
        }
        run.finish();

        let duration_ms = timer.finish();
        match run.state() {
            RunState::Done => info!(run_id = %run_id, duration_ms, "Flipbook run done"),
            RunState::Cancelled => info!(run_id = %run_id, duration_ms, "Flipbook run cancelled"),
            state => warn!(
                run_id = %run_id,
                state = %state,
                failure = ?run.failure().map(ToString::to_string),
                "Flipbook run did not complete"
            ),
        }
        self.events.emit(RUN_FINISHED, Some(run.summary())).await;
        run
    }

    async fn execute(
        &self,
        run: &mut PipelineRun,
        token: &CancellationToken,
    ) -> Result<(), FlipbookError> {
        if token.is_cancelled() {
            return self.cancel(run, token).await;
        }
        self.transition(run, RunState::Generating).await?;

        let run_id = run.id();
        let request = run.request().clone();
        let policy = request.cache_policy();
        for kind in [StageKind::Image, StageKind::Text] {
            run.stage_mut(kind).status = StageStatus::Running;
        }

        let generation = async {
            tokio::join!(
                self.run_stage(run_id, self.image.as_ref(), request.image_params(), policy),
                self.run_stage(run_id, self.text.as_ref(), request.story_params(), policy),
            )
        };
        // Dropping `generation` drops both cache lookups, which releases
        // their pins and hands any led computation to a waiter.
        let (image, text) = tokio::select! {
            biased;
            () = token.cancelled() => return self.cancel(run, token).await,
            stages = generation => stages,
        };

        let image = self.record_stage(run, &request, image).await;
        let text = self.record_stage(run, &request, text).await;
        let (image, text) = match (image, text) {
            (Some(image), Some(text)) => (image, text),
            _ => {
                let failure = [StageKind::Image, StageKind::Text]
                    .into_iter()
                    .find_map(|kind| run.stage(kind).failure.clone())
                    .unwrap_or_else(|| RunFailure::internal("stage produced no artifact"));
                return self.fail(run, failure).await;
            }
        };

        // Cancellation may arrive while stage results are being recorded.
        if token.is_cancelled() {
            drop((image, text));
            return self.cancel(run, token).await;
        }
        self.transition(run, RunState::Compiling).await?;
        let document = match self
            .compiler
            .compile(&image, &text, request.hotspots())
        {
            Ok(document) => document,
            Err(err) => return self.fail(run, RunFailure::from_compile(&err)).await,
        };
        // Pins are held until the document no longer needs the artifacts.
        drop((image, text));

        match self.persist(document).await {
            Ok(document) => {
                run.set_document(document);
                self.transition(run, RunState::Done).await
            }
            Err(failure) => self.fail(run, failure).await,
        }
    }

    async fn run_stage(
        &self,
        run_id: Uuid,
        adapter: &dyn StageAdapter,
        params: &GenerationParameters,
        policy: CachePolicy,
    ) -> StageRun {
        let kind = adapter.kind();
        let fingerprint = StageFingerprint::compute(kind, params);
        let timer = SpanTimer::start(format!("flipbook.stage.{kind}"));
        let attempts = AtomicU32::new(0);

        let result = match adapter.validate(params) {
            Err(err) => Err(err),
            Ok(()) => {
                let attempts = &attempts;
                let retry = &self.retry;
                let safety = self.safety.as_deref();
                self.cache
                    .get_or_compute(&fingerprint, policy, move || async move {
                        with_retry(retry, kind.as_str(), move |attempt| async move {
                            attempts.fetch_add(1, Ordering::Relaxed);
                            debug!(run_id = %run_id, stage = %kind, attempt, "Generating");
                            let artifact = adapter.generate(params).await?;
                            screen(safety, &artifact)?;
                            Ok::<Artifact, StageError>(artifact)
                        })
                        .await
                        .result
                    })
                    .await
            }
        };

        StageRun {
            kind,
            fingerprint,
            result,
            attempts: attempts.load(Ordering::Relaxed),
            duration_ms: timer.finish(),
        }
    }

    /// Copies a stage result into the run, returning the pinned artifact on success.
    async fn record_stage(
        &self,
        run: &mut PipelineRun,
        request: &RunRequest,
        stage: StageRun,
    ) -> Option<crate::cache::PinnedArtifact> {
        let run_id = run.id();
        let record = run.stage_mut(stage.kind);
        record.attempts = stage.attempts;
        record.duration_ms = stage.duration_ms;

        match stage.result {
            Ok(lookup) => {
                record.status = StageStatus::Succeeded;
                record.cache_outcome = Some(lookup.outcome);
                record.artifact = Some(Arc::clone(lookup.artifact.artifact()));
                info!(
                    run_id = %run_id,
                    stage = %stage.kind,
                    fingerprint = stage.fingerprint.short(),
                    cache = %lookup.outcome,
                    attempts = stage.attempts,
                    duration_ms = stage.duration_ms,
                    "Stage completed"
                );
                self.events
                    .emit(
                        STAGE_COMPLETED,
                        Some(serde_json::json!({
                            "run_id": run_id.to_string(),
                            "stage": stage.kind,
                            "fingerprint": stage.fingerprint.as_str(),
                            "cache": lookup.outcome,
                            "attempts": stage.attempts,
                        })),
                    )
                    .await;
                Some(lookup.artifact)
            }
            Err(err) => {
                let failure = RunFailure::from_stage(
                    stage.kind,
                    &err,
                    &stage.fingerprint,
                    request.params_for(stage.kind),
                );
                record.status = if matches!(err, StageError::Cancelled { .. }) {
                    StageStatus::Cancelled
                } else {
                    StageStatus::Failed
                };
                record.failure = Some(failure);
                warn!(
                    run_id = %run_id,
                    stage = %stage.kind,
                    fingerprint = stage.fingerprint.short(),
                    error_kind = %err.kind(),
                    attempts = stage.attempts,
                    error = %err,
                    "Stage failed"
                );
                let mut data = err.to_dict();
                data.insert("run_id".to_string(), serde_json::json!(run_id.to_string()));
                data.insert("attempts".to_string(), serde_json::json!(stage.attempts));
                self.events
                    .emit(STAGE_FAILED, Some(serde_json::json!(data)))
                    .await;
                None
            }
        }
    }

    async fn persist(&self, document: FlipbookDocument) -> Result<FlipbookDocument, RunFailure> {
        let key = document.storage_key();
        match self.store.put(&key, document.as_bytes()).await {
            Ok(handle) => {
                debug!(key = %key, backend = %handle.backend, "Stored flipbook document");
                Ok(document.with_storage(handle))
            }
            Err(err) => {
                error!(key = %key, error = %err, "Failed to store flipbook document");
                Err(RunFailure::from_storage(&err))
            }
        }
    }

    async fn transition(&self, run: &mut PipelineRun, to: RunState) -> Result<(), FlipbookError> {
        let from = run.state();
        run.transition(to)?;
        self.emit_transition(run, from, to).await;
        Ok(())
    }

    async fn fail(&self, run: &mut PipelineRun, failure: RunFailure) -> Result<(), FlipbookError> {
        let from = run.state();
        run.fail(failure)?;
        self.emit_transition(run, from, RunState::Failed).await;
        Ok(())
    }

    async fn cancel(
        &self,
        run: &mut PipelineRun,
        token: &CancellationToken,
    ) -> Result<(), FlipbookError> {
        let from = run.state();
        let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
        info!(run_id = %run.id(), reason = %reason, "Cancelling run");
        run.cancel(reason)?;
        self.emit_transition(run, from, RunState::Cancelled).await;
        Ok(())
    }

    async fn emit_transition(&self, run: &PipelineRun, from: RunState, to: RunState) {
        debug!(run_id = %run.id(), from = %from, to = %to, "Run state changed");
        self.events
            .emit(
                RUN_STATE_CHANGED,
                Some(serde_json::json!({
                    "run_id": run.id().to_string(),
                    "from": from,
                    "to": to,
                })),
            )
            .await;
    }
}

/// Applies the safety hook to fresh story text.
fn screen(hook: Option<&dyn ContentSafetyHook>, artifact: &Artifact) -> Result<(), StageError> {
    match (hook, artifact.as_text()) {
        (Some(hook), Some(text)) => hook
            .screen(text)
            .map_err(|rejected| StageError::rejected(StageKind::Text, rejected.reason)),
        _ => Ok(()),
    }
}

impl fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("image", &self.image)
            .field("text", &self.text)
            .field("cache", &self.cache)
            .field("store", &self.store.backend())
            .field("retry", &self.retry)
            .field("safety", &self.safety.is_some())
            .field("compiler", &self.compiler)
            .finish_non_exhaustive()
    }
}

/// Builder for [`PipelineOrchestrator`].
pub struct PipelineOrchestratorBuilder {
    image: Arc<dyn StageAdapter>,
    text: Arc<dyn StageAdapter>,
    cache: Option<ArtifactCache>,
    store: Option<Arc<dyn ArtifactStore>>,
    retry: RetryConfig,
    events: Option<Arc<dyn EventSink>>,
    safety: Option<Arc<dyn ContentSafetyHook>>,
    compiler: FlipbookCompiler,
}

impl PipelineOrchestratorBuilder {
    fn new(image: Arc<dyn StageAdapter>, text: Arc<dyn StageAdapter>) -> Self {
        Self {
            image,
            text,
            cache: None,
            store: None,
            retry: RetryConfig::default(),
            events: None,
            safety: None,
            compiler: FlipbookCompiler::default(),
        }
    }

    /// Shares an existing cache (for example across orchestrators).
    #[must_use]
    pub fn cache(mut self, cache: ArtifactCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets where compiled documents are stored. Defaults to memory.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the lifecycle event sink. Defaults to discarding events.
    #[must_use]
    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Screens fresh story text before it is cached.
    #[must_use]
    pub fn safety_hook(mut self, hook: Arc<dyn ContentSafetyHook>) -> Self {
        self.safety = Some(hook);
        self
    }

    /// Sets the compiler.
    #[must_use]
    pub fn compiler(mut self, compiler: FlipbookCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Builds the orchestrator.
    #[must_use]
    pub fn build(self) -> PipelineOrchestrator {
        PipelineOrchestrator {
            image: self.image,
            text: self.text,
            cache: self.cache.unwrap_or_default(),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryArtifactStore::new())),
            retry: self.retry,
            events: self.events.unwrap_or_else(|| Arc::new(NoOpEventSink)),
            safety: self.safety,
            compiler: self.compiler,
        }
    }
}

impl fmt::Debug for PipelineOrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOrchestratorBuilder")
            .field("image", &self.image)
            .field("text", &self.text)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
