//! End-to-end pipeline scenarios.

use crate::batch::{BatchConfig, BatchRequest, BatchRunner, PromptTemplate};
use crate::cache::{ArtifactCache, CacheOutcome, CachePolicy};
use crate::cancellation::CancellationToken;
use crate::core::{NumericParams, RunState, StageKind, StageStatus};
use crate::errors::ErrorKind;
use crate::events::{
    EventSink, RUN_FINISHED, RUN_STARTED, RUN_STATE_CHANGED, STAGE_COMPLETED, STAGE_FAILED,
};
use crate::pipeline::{FailureOrigin, PipelineOrchestrator, RetryConfig, RunOutcome, RunRequest};
use crate::stages::{
    CapabilityError, ImageStage, KeywordSafetyFilter, PlaceholderImageCapability,
    PlaceholderStoryCapability, RawOutput, TextStage,
};
use crate::storage::{ArtifactStore, InMemoryArtifactStore};
use crate::testing::{
    assert_cache_outcome, assert_run_done, assert_run_failed, assert_stage_status,
    assert_state_sequence, duck_params, duck_request, FnCapability, GatedCapability,
    ScriptedCapability, TestHarness, DUCK_IMAGE_PROMPT,
};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn png() -> RawOutput {
    RawOutput::image("image/png", vec![0x89, b'P', b'N', b'G'])
}

#[tokio::test]
async fn test_duck_scenario() {
    let harness = TestHarness::placeholder();

    let run = harness.orchestrator.run(duck_request()).await;

    assert_run_done(&run);
    assert_state_sequence(
        &run,
        &[
            RunState::Pending,
            RunState::Generating,
            RunState::Compiling,
            RunState::Done,
        ],
    );
    assert_stage_status(&run, StageKind::Image, StageStatus::Succeeded);
    assert_stage_status(&run, StageKind::Text, StageStatus::Succeeded);
    assert_cache_outcome(&run, StageKind::Image, CacheOutcome::Miss);
    assert_cache_outcome(&run, StageKind::Text, CacheOutcome::Miss);

    let document = run.document().unwrap();
    assert!(document.html.contains("data:image/svg+xml;base64,"));
    assert!(document.html.contains("Once upon a time a cheerful duck waddled happily"));
    assert!(document.html.contains("waddle_duck"));

    let handle = run.document_handle().unwrap();
    let stored = harness.store.get(handle).await.unwrap();
    assert_eq!(stored, document.html.as_bytes());
    assert_eq!(harness.cache.pinned_count(), 0);

    assert_eq!(
        harness.events.event_types(),
        vec![
            RUN_STARTED,
            RUN_STATE_CHANGED,
            STAGE_COMPLETED,
            STAGE_COMPLETED,
            RUN_STATE_CHANGED,
            RUN_STATE_CHANGED,
            RUN_FINISHED,
        ]
    );
    let finished = harness.events.last_payload(RUN_FINISHED).unwrap();
    assert_eq!(finished["run_id"], run.id().to_string());
    assert_eq!(finished["document"], handle.key.as_str());
}

#[tokio::test]
async fn test_image_failure_keeps_story_and_emits_no_document() {
    let image = Arc::new(ScriptedCapability::always_err(CapabilityError::Failed(
        "decoder produced zero bytes".to_string(),
    )));
    let harness = TestHarness::new(image, Arc::new(PlaceholderStoryCapability::new()));

    let run = harness.orchestrator.run(duck_request()).await;

    assert_run_failed(&run);
    assert_state_sequence(
        &run,
        &[RunState::Pending, RunState::Generating, RunState::Failed],
    );
    assert_stage_status(&run, StageKind::Image, StageStatus::Failed);
    assert_stage_status(&run, StageKind::Text, StageStatus::Succeeded);
    assert!(run.stage(StageKind::Text).artifact.is_some());

    let failure = run.failure().unwrap();
    assert_eq!(failure.origin, FailureOrigin::Image);
    assert_eq!(failure.kind, ErrorKind::InvalidOutput);
    assert_eq!(
        failure.fingerprint.as_ref(),
        Some(&run.stage(StageKind::Image).fingerprint)
    );
    assert_eq!(
        failure.parameters.as_ref().map(|p| p.prompt_text()),
        Some(DUCK_IMAGE_PROMPT)
    );

    assert!(harness.store.is_empty());
    assert_eq!(harness.events.events_of_type(STAGE_FAILED).len(), 1);
    // The successful story stays cached for the next attempt.
    assert!(harness.cache.contains(&run.stage(StageKind::Text).fingerprint));
    assert!(!harness.cache.contains(&run.stage(StageKind::Image).fingerprint));
}

#[tokio::test]
async fn test_persistent_transient_failure_uses_every_attempt() {
    let image = Arc::new(ScriptedCapability::always_err(CapabilityError::Unavailable(
        "weights not loaded".to_string(),
    )));
    let harness = TestHarness::new(image.clone(), Arc::new(PlaceholderStoryCapability::new()));

    let run = harness.orchestrator.run(duck_request()).await;

    assert_run_failed(&run);
    assert_eq!(image.calls(), 3);
    assert_eq!(run.stage(StageKind::Image).attempts, 3);
    assert_eq!(run.stage(StageKind::Text).attempts, 1);
    assert_eq!(run.failure().unwrap().kind, ErrorKind::CapabilityUnavailable);
}

#[tokio::test]
async fn test_transient_failure_then_success() {
    let image = Arc::new(
        ScriptedCapability::always(png()).with_script([Err(CapabilityError::TimedOut)]),
    );
    let harness = TestHarness::new(image.clone(), Arc::new(PlaceholderStoryCapability::new()));

    let run = harness.orchestrator.run(duck_request()).await;

    assert_run_done(&run);
    assert_eq!(run.stage(StageKind::Image).attempts, 2);
    assert_eq!(image.calls(), 2);
}

#[tokio::test]
async fn test_non_retryable_failure_is_attempted_once() {
    let text = Arc::new(ScriptedCapability::always(RawOutput::text("   ")));
    let harness = TestHarness::new(Arc::new(PlaceholderImageCapability::new()), text.clone());

    let run = harness.orchestrator.run(duck_request()).await;

    assert_run_failed(&run);
    assert_eq!(text.calls(), 1);
    assert_eq!(run.failure().unwrap().origin, FailureOrigin::Text);
}

#[tokio::test]
async fn test_second_run_hits_cache() {
    let image = Arc::new(ScriptedCapability::always(png()));
    let text = Arc::new(ScriptedCapability::always(RawOutput::text("A duck waddled home.")));
    let harness = TestHarness::new(image.clone(), text.clone());

    let first = harness.orchestrator.run(duck_request()).await;
    let second = harness.orchestrator.run(duck_request()).await;

    assert_run_done(&first);
    assert_run_done(&second);
    assert_cache_outcome(&second, StageKind::Image, CacheOutcome::Hit);
    assert_cache_outcome(&second, StageKind::Text, CacheOutcome::Hit);
    assert_eq!(second.stage(StageKind::Image).attempts, 0);
    assert_eq!(image.calls(), 1);
    assert_eq!(text.calls(), 1);

    // Same artifacts, same document.
    assert_eq!(
        first.document().unwrap().content_hash,
        second.document().unwrap().content_hash
    );
    assert_ne!(first.id(), second.id());
    assert_eq!(harness.cache.stats().hits, 2);
}

#[tokio::test]
async fn test_force_fresh_recomputes() {
    let image = Arc::new(ScriptedCapability::always(png()));
    let harness = TestHarness::new(image.clone(), Arc::new(PlaceholderStoryCapability::new()));

    harness.orchestrator.run(duck_request()).await;
    let fresh = harness.orchestrator.run(duck_request().force_fresh()).await;

    assert_run_done(&fresh);
    assert_cache_outcome(&fresh, StageKind::Image, CacheOutcome::Bypassed);
    assert_eq!(image.calls(), 2);
    assert_eq!(
        fresh.manifest().outcome_for(StageKind::Text),
        Some(CacheOutcome::Bypassed)
    );
}

#[tokio::test]
async fn test_concurrent_runs_share_one_computation() {
    let image = Arc::new(GatedCapability::new(png()));
    let text = Arc::new(ScriptedCapability::always(RawOutput::text("Shared story.")));
    let harness = TestHarness::new(image.clone(), text.clone());

    let first = tokio::spawn({
        let orchestrator = harness.orchestrator.clone();
        async move { orchestrator.run(duck_request()).await }
    });
    image.wait_started(1).await;
    let second = tokio::spawn({
        let orchestrator = harness.orchestrator.clone();
        async move { orchestrator.run(duck_request()).await }
    });
    // The second run is blocked on the first run's image computation.
    while harness.cache.waiting_count() == 0 {
        tokio::task::yield_now().await;
    }
    image.open();

    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert_run_done(&first);
    assert_run_done(&second);
    assert_eq!(image.started(), 1);
    let outcomes = [
        first.stage(StageKind::Image).cache_outcome,
        second.stage(StageKind::Image).cache_outcome,
    ];
    assert!(outcomes.contains(&Some(CacheOutcome::Miss)));
    assert!(outcomes.contains(&Some(CacheOutcome::Joined)));
    assert_eq!(text.calls(), 1);
}

#[tokio::test]
async fn test_cancellation_during_generation() {
    let image = Arc::new(GatedCapability::new(png()));
    let harness = TestHarness::new(image.clone(), Arc::new(PlaceholderStoryCapability::new()));
    let token = CancellationToken::new();

    let handle = tokio::spawn({
        let orchestrator = harness.orchestrator.clone();
        let token = token.clone();
        async move {
            orchestrator
                .run_with_cancellation(duck_request(), &token)
                .await
        }
    });
    image.wait_started(1).await;
    token.cancel("user requested stop");
    let run = handle.await.unwrap();

    assert_eq!(run.state(), RunState::Cancelled);
    assert_state_sequence(
        &run,
        &[RunState::Pending, RunState::Generating, RunState::Cancelled],
    );
    assert!(run.document().is_none());
    assert!(run.failure().is_none());
    assert_stage_status(&run, StageKind::Image, StageStatus::Cancelled);
    assert_eq!(
        run.outcome(),
        RunOutcome::Cancelled {
            reason: "user requested stop".to_string()
        }
    );

    assert_eq!(harness.cache.pinned_count(), 0);
    assert_eq!(harness.cache.in_flight_count(), 0);
    assert_eq!(image.abandoned(), 1);
    assert!(harness.store.is_empty());
}

/// Cancels a token as soon as any stage completes.
#[derive(Debug)]
struct CancelOnStageCompleted {
    token: CancellationToken,
}

#[async_trait]
impl EventSink for CancelOnStageCompleted {
    async fn emit(&self, event_type: &str, _data: Option<serde_json::Value>) {
        if event_type == STAGE_COMPLETED {
            self.token.cancel("stopped after generation");
        }
    }
}

#[tokio::test]
async fn test_cancellation_after_generation_skips_compile() {
    let token = CancellationToken::new();
    let store = InMemoryArtifactStore::new();
    let cache = ArtifactCache::default();
    let orchestrator = PipelineOrchestrator::builder(
        Arc::new(ImageStage::new(Arc::new(PlaceholderImageCapability::new()))),
        Arc::new(TextStage::new(Arc::new(PlaceholderStoryCapability::new()))),
    )
    .cache(cache.clone())
    .store(Arc::new(store.clone()))
    .event_sink(Arc::new(CancelOnStageCompleted {
        token: token.clone(),
    }))
    .build();

    let run = orchestrator
        .run_with_cancellation(duck_request(), &token)
        .await;

    assert_state_sequence(
        &run,
        &[RunState::Pending, RunState::Generating, RunState::Cancelled],
    );
    assert!(run.document().is_none());
    // Both stages finished before the cancel, so their results stand.
    assert_stage_status(&run, StageKind::Image, StageStatus::Succeeded);
    assert_stage_status(&run, StageKind::Text, StageStatus::Succeeded);
    assert_eq!(
        run.outcome(),
        RunOutcome::Cancelled {
            reason: "stopped after generation".to_string()
        }
    );
    assert_eq!(cache.pinned_count(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_rejected_story_is_not_cached() {
    let text = Arc::new(ScriptedCapability::always(RawOutput::text(
        "The duck met a scary monster.",
    )));
    let store = InMemoryArtifactStore::new();
    let orchestrator = PipelineOrchestrator::builder(
        Arc::new(ImageStage::new(Arc::new(PlaceholderImageCapability::new()))),
        Arc::new(TextStage::new(text.clone())),
    )
    .store(Arc::new(store.clone()))
    .retry(RetryConfig::immediate(2))
    .safety_hook(Arc::new(KeywordSafetyFilter::new(["monster"]).unwrap()))
    .build();

    let first = orchestrator.run(duck_request()).await;
    let second = orchestrator.run(duck_request()).await;

    for run in [&first, &second] {
        assert_run_failed(run);
        assert_eq!(run.failure().unwrap().kind, ErrorKind::RejectedContent);
        assert_eq!(run.stage(StageKind::Text).attempts, 1);
    }
    assert_eq!(text.calls(), 2);
    assert!(!orchestrator
        .cache()
        .contains(&first.stage(StageKind::Text).fingerprint));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_text_stage_rejects_oversized_request_without_invoking() {
    let text = Arc::new(ScriptedCapability::always(RawOutput::text("story")));
    let orchestrator = PipelineOrchestrator::builder(
        Arc::new(ImageStage::new(Arc::new(PlaceholderImageCapability::new()))),
        Arc::new(TextStage::new(text.clone()).with_max_units_cap(100)),
    )
    .build();

    let run = orchestrator.run(duck_request()).await;

    assert_run_failed(&run);
    assert_eq!(run.failure().unwrap().kind, ErrorKind::InvalidParameter);
    assert_eq!(text.calls(), 0);
    assert_eq!(run.stage(StageKind::Text).attempts, 0);
}

#[tokio::test]
async fn test_custom_hotspots_reach_document() {
    let harness = TestHarness::placeholder();
    let request = duck_request().with_hotspots(vec![
        crate::compiler::Hotspot::new(10, 20, "quack"),
        crate::compiler::Hotspot::new(30, 40, "flap"),
    ]);

    let run = harness.orchestrator.run(request).await;

    assert_run_done(&run);
    let document = run.document().unwrap();
    assert_eq!(document.hotspots.len(), 2);
    assert!(document.html.contains("\"trigger_action\":\"quack\""));
}

#[tokio::test]
async fn test_batch_with_one_failing_index() {
    const BASE_SEED: u64 = 1_000;
    let image = Arc::new(FnCapability::new(|_prompt: &str, params: &NumericParams| {
        if params.seed == Some(BASE_SEED + 2) {
            Err(CapabilityError::Failed("corrupt latent".to_string()))
        } else {
            Ok(RawOutput::image("image/png", vec![1, 2, 3]))
        }
    }));
    let harness = TestHarness::new(image, Arc::new(PlaceholderStoryCapability::new()));
    let runner = BatchRunner::new(harness.orchestrator.clone(), BatchConfig::default());

    let request = BatchRequest::new(
        PromptTemplate::new("Uncle Roggers on the farm", "Uncle Roggers' day"),
        duck_params().with_seed(Some(BASE_SEED)),
        3,
    )
    .unwrap();
    let report = runner.run(request).await;

    assert_eq!(report.len(), 3);
    assert_eq!(report.done_count(), 2);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.cancelled_count(), 0);

    let indexes: Vec<usize> = report.entries.iter().map(|e| e.index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);

    let failures = report.failures();
    assert_eq!(failures[0].0, 2);
    assert_eq!(failures[0].1.origin, FailureOrigin::Image);
    assert_eq!(failures[0].1.kind, ErrorKind::InvalidOutput);

    for entry in &report.entries {
        let run = entry.run.as_ref().unwrap();
        let variation = entry.variation.as_deref().unwrap();
        assert!(run
            .request()
            .image_params()
            .prompt_text()
            .ends_with(&format!(", {variation}")));
        assert_eq!(
            run.request().image_params().seed(),
            Some(BASE_SEED + entry.index as u64)
        );
    }
    assert_eq!(harness.store.len(), 2);
}

#[tokio::test]
async fn test_request_round_trips_through_json() {
    let request = duck_request().with_cache_policy(CachePolicy::ForceFresh);
    let json = serde_json::to_string(&request).unwrap();
    let back: RunRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(back, request);
}
