//! Run requests, per-stage records, and the finished run.

use crate::cache::{CacheOutcome, CachePolicy};
use crate::compiler::{FlipbookDocument, Hotspot};
use crate::core::{
    Artifact, GenerationParameters, RunState, StageFingerprint, StageKind, StageStatus,
};
use crate::errors::{
    CompileError, ErrorKind, FlipbookError, InvalidParameterError, StageError, StorageError,
};
use crate::storage::StorageHandle;
use crate::utils::{duration_ms, generate_run_id, now_utc, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Input to one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    image_params: GenerationParameters,
    story_params: GenerationParameters,
    #[serde(default = "default_hotspots")]
    hotspots: Vec<Hotspot>,
    #[serde(default)]
    cache_policy: CachePolicy,
}

fn default_hotspots() -> Vec<Hotspot> {
    vec![Hotspot::waddle_duck()]
}

impl RunRequest {
    /// Derives image and story parameters from shared numeric settings.
    pub fn new(
        image_prompt: impl Into<String>,
        story_prompt: impl Into<String>,
        base: &GenerationParameters,
    ) -> Result<Self, InvalidParameterError> {
        Ok(Self::from_params(
            base.with_prompt(image_prompt)?,
            base.with_prompt(story_prompt)?,
        ))
    }

    /// Uses fully specified parameters for each stage.
    #[must_use]
    pub fn from_params(image_params: GenerationParameters, story_params: GenerationParameters) -> Self {
        Self {
            image_params,
            story_params,
            hotspots: default_hotspots(),
            cache_policy: CachePolicy::UseCache,
        }
    }

    /// Replaces the hotspots.
    #[must_use]
    pub fn with_hotspots(mut self, hotspots: Vec<Hotspot>) -> Self {
        self.hotspots = hotspots;
        self
    }

    /// Sets the cache policy for both stages.
    #[must_use]
    pub const fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Recomputes both stages even when cached.
    #[must_use]
    pub const fn force_fresh(self) -> Self {
        self.with_cache_policy(CachePolicy::ForceFresh)
    }

    /// Parameters for the image stage.
    #[must_use]
    pub const fn image_params(&self) -> &GenerationParameters {
        &self.image_params
    }

    /// Parameters for the text stage.
    #[must_use]
    pub const fn story_params(&self) -> &GenerationParameters {
        &self.story_params
    }

    /// Parameters for the given stage.
    #[must_use]
    pub const fn params_for(&self, stage: StageKind) -> &GenerationParameters {
        match stage {
            StageKind::Image => &self.image_params,
            StageKind::Text => &self.story_params,
        }
    }

    /// Hotspots passed to the compiler.
    #[must_use]
    pub fn hotspots(&self) -> &[Hotspot] {
        &self.hotspots
    }

    /// The cache policy.
    #[must_use]
    pub const fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }
}

/// Where a run failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureOrigin {
    /// The image stage.
    Image,
    /// The text stage.
    Text,
    /// The compiler.
    Compile,
    /// Persisting the document.
    Storage,
    /// The orchestrator itself.
    Orchestrator,
}

impl From<StageKind> for FailureOrigin {
    fn from(kind: StageKind) -> Self {
        match kind {
            StageKind::Image => Self::Image,
            StageKind::Text => Self::Text,
        }
    }
}

impl fmt::Display for FailureOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Text => write!(f, "text"),
            Self::Compile => write!(f, "compile"),
            Self::Storage => write!(f, "storage"),
            Self::Orchestrator => write!(f, "orchestrator"),
        }
    }
}

/// Why a run ended `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Which part of the pipeline failed.
    pub origin: FailureOrigin,
    /// Error classification.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Fingerprint of the failing stage invocation, when there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<StageFingerprint>,
    /// Parameters of the failing stage invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<GenerationParameters>,
}

impl RunFailure {
    /// A stage failure.
    #[must_use]
    pub fn from_stage(
        stage: StageKind,
        error: &StageError,
        fingerprint: &StageFingerprint,
        parameters: &GenerationParameters,
    ) -> Self {
        Self {
            origin: stage.into(),
            kind: error.kind(),
            message: error.to_string(),
            fingerprint: Some(fingerprint.clone()),
            parameters: Some(parameters.clone()),
        }
    }

    /// A compiler failure.
    #[must_use]
    pub fn from_compile(error: &CompileError) -> Self {
        Self {
            origin: FailureOrigin::Compile,
            kind: error.kind(),
            message: error.to_string(),
            fingerprint: None,
            parameters: None,
        }
    }

    /// A storage failure.
    #[must_use]
    pub fn from_storage(error: &StorageError) -> Self {
        Self {
            origin: FailureOrigin::Storage,
            kind: ErrorKind::Storage,
            message: error.to_string(),
            fingerprint: None,
            parameters: None,
        }
    }

    /// A request that could not be built.
    #[must_use]
    pub fn invalid_request(error: &InvalidParameterError) -> Self {
        Self {
            origin: FailureOrigin::Orchestrator,
            kind: ErrorKind::InvalidParameter,
            message: error.to_string(),
            fingerprint: None,
            parameters: None,
        }
    }

    /// An orchestration bug.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            origin: FailureOrigin::Orchestrator,
            kind: ErrorKind::Internal,
            message: message.into(),
            fingerprint: None,
            parameters: None,
        }
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] {}", self.origin, self.kind, self.message)
    }
}

/// What happened to one stage during a run.
#[derive(Debug, Clone)]
pub struct StageRecord {
    /// The stage.
    pub stage: StageKind,
    /// Final status.
    pub status: StageStatus,
    /// Fingerprint of the invocation.
    pub fingerprint: StageFingerprint,
    /// The artifact, kept even when the other stage failed.
    pub artifact: Option<Arc<Artifact>>,
    /// The failure, if the stage failed.
    pub failure: Option<RunFailure>,
    /// Capability invocations made by this run (0 on a hit or join).
    pub attempts: u32,
    /// How the cache served the stage.
    pub cache_outcome: Option<CacheOutcome>,
    /// Wall-clock time spent in the stage.
    pub duration_ms: f64,
}

impl StageRecord {
    pub(crate) fn new(stage: StageKind, fingerprint: StageFingerprint) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            fingerprint,
            artifact: None,
            failure: None,
            attempts: 0,
            cache_outcome: None,
            duration_ms: 0.0,
        }
    }
}

/// One entry of the cache manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// The stage.
    pub stage: StageKind,
    /// Its fingerprint.
    pub fingerprint: StageFingerprint,
    /// How the cache served it.
    pub outcome: CacheOutcome,
}

/// Cache outcomes of every completed stage of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    /// Entries in stage order.
    pub entries: Vec<ManifestEntry>,
}

impl CacheManifest {
    /// The outcome for a stage, if it completed.
    #[must_use]
    pub fn outcome_for(&self, stage: StageKind) -> Option<CacheOutcome> {
        self.entries
            .iter()
            .find(|entry| entry.stage == stage)
            .map(|entry| entry.outcome)
    }
}

/// A recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous state.
    pub from: RunState,
    /// New state.
    pub to: RunState,
    /// When the change happened.
    pub at: Timestamp,
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The document was compiled and stored.
    Done {
        /// Where the document lives.
        document_handle: StorageHandle,
    },
    /// The run failed.
    Failed(RunFailure),
    /// The run was cancelled before compilation.
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },
}

/// A pipeline run.
///
/// Returned by the orchestrator once it reaches a terminal state; it exposes
/// only read access.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    id: Uuid,
    request: RunRequest,
    state: RunState,
    transitions: Vec<StateTransition>,
    image: StageRecord,
    text: StageRecord,
    document: Option<FlipbookDocument>,
    failure: Option<RunFailure>,
    cancel_reason: Option<String>,
    started_at: Timestamp,
    finished_at: Option<Timestamp>,
}

impl PipelineRun {
    pub(crate) fn new(request: RunRequest) -> Self {
        let image = StageRecord::new(
            StageKind::Image,
            StageFingerprint::compute(StageKind::Image, request.image_params()),
        );
        let text = StageRecord::new(
            StageKind::Text,
            StageFingerprint::compute(StageKind::Text, request.story_params()),
        );
        Self {
            id: generate_run_id(),
            request,
            state: RunState::Pending,
            transitions: Vec::new(),
            image,
            text,
            document: None,
            failure: None,
            cancel_reason: None,
            started_at: now_utc(),
            finished_at: None,
        }
    }

    /// The run id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The request that started the run.
    #[must_use]
    pub const fn request(&self) -> &RunRequest {
        &self.request
    }

    /// The current (final, once returned) state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Every state the run passed through, starting with `Pending`.
    #[must_use]
    pub fn state_history(&self) -> Vec<RunState> {
        std::iter::once(RunState::Pending)
            .chain(self.transitions.iter().map(|t| t.to))
            .collect()
    }

    /// Timestamped transitions.
    #[must_use]
    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// The record for one stage.
    #[must_use]
    pub const fn stage(&self, stage: StageKind) -> &StageRecord {
        match stage {
            StageKind::Image => &self.image,
            StageKind::Text => &self.text,
        }
    }

    /// The compiled document, if the run reached `Done`.
    #[must_use]
    pub const fn document(&self) -> Option<&FlipbookDocument> {
        self.document.as_ref()
    }

    /// Where the document was stored.
    #[must_use]
    pub fn document_handle(&self) -> Option<&StorageHandle> {
        self.document.as_ref().and_then(|d| d.storage.as_ref())
    }

    /// The failure, if the run ended `Failed`.
    #[must_use]
    pub const fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    /// When the run started.
    #[must_use]
    pub const fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// When the run reached its terminal state.
    #[must_use]
    pub const fn finished_at(&self) -> Option<Timestamp> {
        self.finished_at
    }

    /// Run duration in milliseconds, once finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at.map(|end| duration_ms(self.started_at, end))
    }

    /// Cache outcomes of the completed stages.
    #[must_use]
    pub fn manifest(&self) -> CacheManifest {
        let entries = [&self.image, &self.text]
            .into_iter()
            .filter_map(|record| {
                record.cache_outcome.map(|outcome| ManifestEntry {
                    stage: record.stage,
                    fingerprint: record.fingerprint.clone(),
                    outcome,
                })
            })
            .collect();
        CacheManifest { entries }
    }

    /// The terminal result.
    #[must_use]
    pub fn outcome(&self) -> RunOutcome {
        if let Some(failure) = &self.failure {
            return RunOutcome::Failed(failure.clone());
        }
        match (self.state, self.document_handle()) {
            (RunState::Done, Some(handle)) => RunOutcome::Done {
                document_handle: handle.clone(),
            },
            (RunState::Cancelled, _) => RunOutcome::Cancelled {
                reason: self.cancel_reason.clone().unwrap_or_default(),
            },
            (state, _) => RunOutcome::Failed(RunFailure::internal(format!(
                "run has no terminal result in state {state}"
            ))),
        }
    }

    /// A JSON summary for logs and events.
    #[must_use]
    pub fn summary(&self) -> serde_json::Value {
        let stage = |record: &StageRecord| {
            serde_json::json!({
                "status": record.status,
                "fingerprint": record.fingerprint.short(),
                "attempts": record.attempts,
                "cache": record.cache_outcome,
                "duration_ms": record.duration_ms,
            })
        };
        serde_json::json!({
            "run_id": self.id.to_string(),
            "state": self.state,
            "image": stage(&self.image),
            "text": stage(&self.text),
            "document": self.document_handle().map(|h| h.key.clone()),
            "failure": self.failure.as_ref().map(ToString::to_string),
            "cancel_reason": self.cancel_reason,
            "duration_ms": self.duration_ms(),
        })
    }

    pub(crate) fn transition(&mut self, to: RunState) -> Result<(), FlipbookError> {
        if !self.state.can_transition_to(to) {
            return Err(FlipbookError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.transitions.push(StateTransition {
            from: self.state,
            to,
            at: now_utc(),
        });
        self.state = to;
        Ok(())
    }

    pub(crate) fn stage_mut(&mut self, stage: StageKind) -> &mut StageRecord {
        match stage {
            StageKind::Image => &mut self.image,
            StageKind::Text => &mut self.text,
        }
    }

    pub(crate) fn set_document(&mut self, document: FlipbookDocument) {
        self.document = Some(document);
    }

    pub(crate) fn fail(&mut self, failure: RunFailure) -> Result<(), FlipbookError> {
        self.transition(RunState::Failed)?;
        self.failure = Some(failure);
        Ok(())
    }

    pub(crate) fn cancel(&mut self, reason: String) -> Result<(), FlipbookError> {
        self.transition(RunState::Cancelled)?;
        for stage in [StageKind::Image, StageKind::Text] {
            let record = self.stage_mut(stage);
            if !record.status.is_terminal() {
                record.status = StageStatus::Cancelled;
            }
        }
        self.cancel_reason = Some(reason);
        Ok(())
    }

    /// Records an orchestration error, failing the run if it is still open.
    pub(crate) fn abort(&mut self, failure: RunFailure) {
        if self.state.can_transition_to(RunState::Failed) {
            self.transitions.push(StateTransition {
                from: self.state,
                to: RunState::Failed,
                at: now_utc(),
            });
            self.state = RunState::Failed;
        }
        self.document = None;
        self.failure = Some(failure);
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(now_utc());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::duck_params;
    use pretty_assertions::assert_eq;

    fn request() -> RunRequest {
        RunRequest::new("A cheerful duck", "A duck's story", &duck_params()).unwrap()
    }

    #[test]
    fn test_request_derives_stage_params() {
        let request = request();
        assert_eq!(request.image_params().prompt_text(), "A cheerful duck");
        assert_eq!(request.story_params().prompt_text(), "A duck's story");
        assert_eq!(request.story_params().guidance_scale(), 7.0);
        assert_eq!(request.hotspots(), &[Hotspot::waddle_duck()]);
        assert_eq!(request.cache_policy(), CachePolicy::UseCache);
        assert_eq!(request.force_fresh().cache_policy(), CachePolicy::ForceFresh);
    }

    #[test]
    fn test_request_rejects_empty_prompt() {
        let err = RunRequest::new("duck", " ", &duck_params()).unwrap_err();
        assert_eq!(err.field, "prompt_text");
    }

    #[test]
    fn test_new_run_is_pending() {
        let run = PipelineRun::new(request());
        assert_eq!(run.state(), RunState::Pending);
        assert_eq!(run.state_history(), vec![RunState::Pending]);
        assert_eq!(run.stage(StageKind::Image).status, StageStatus::Pending);
        assert!(run.manifest().entries.is_empty());
        assert!(run.finished_at().is_none());
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut run = PipelineRun::new(request());
        let err = run.transition(RunState::Done).unwrap_err();
        assert!(matches!(
            err,
            FlipbookError::InvalidTransition {
                from: RunState::Pending,
                to: RunState::Done
            }
        ));
        assert_eq!(run.state(), RunState::Pending);
    }

    #[test]
    fn test_cancel_marks_open_stages() {
        let mut run = PipelineRun::new(request());
        run.transition(RunState::Generating).unwrap();
        run.stage_mut(StageKind::Image).status = StageStatus::Succeeded;
        run.stage_mut(StageKind::Text).status = StageStatus::Running;

        run.cancel("user".to_string()).unwrap();

        assert_eq!(run.stage(StageKind::Image).status, StageStatus::Succeeded);
        assert_eq!(run.stage(StageKind::Text).status, StageStatus::Cancelled);
        assert_eq!(
            run.outcome(),
            RunOutcome::Cancelled {
                reason: "user".to_string()
            }
        );
    }

    #[test]
    fn test_abort_after_terminal_keeps_state() {
        let mut run = PipelineRun::new(request());
        run.transition(RunState::Generating).unwrap();
        run.cancel("stop".to_string()).unwrap();

        run.abort(RunFailure::internal("late"));

        assert_eq!(run.state(), RunState::Cancelled);
        assert!(matches!(run.outcome(), RunOutcome::Failed(f) if f.kind == ErrorKind::Internal));
    }

    #[test]
    fn test_manifest_lists_completed_stages() {
        let mut run = PipelineRun::new(request());
        run.stage_mut(StageKind::Text).cache_outcome = Some(CacheOutcome::Hit);

        let manifest = run.manifest();
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.outcome_for(StageKind::Text), Some(CacheOutcome::Hit));
        assert_eq!(manifest.outcome_for(StageKind::Image), None);
    }

    #[test]
    fn test_failure_display() {
        let params = duck_params();
        let fp = StageFingerprint::compute(StageKind::Image, &params);
        let failure = RunFailure::from_stage(
            StageKind::Image,
            &StageError::unavailable(StageKind::Image, "weights not loaded"),
            &fp,
            &params,
        );
        assert_eq!(failure.origin, FailureOrigin::Image);
        assert_eq!(
            failure.to_string(),
            "[image:capability_unavailable] image capability unavailable: weights not loaded"
        );
    }
}
