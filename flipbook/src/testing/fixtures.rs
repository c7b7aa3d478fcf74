//! Test fixtures for flipbook pipelines.

use std::sync::Arc;

use crate::cache::{ArtifactCache, CacheConfig};
use crate::core::{Artifact, GenerationParameters, ImageArtifact, StageFingerprint, StageKind, TextArtifact};
use crate::events::CollectingEventSink;
use crate::pipeline::{PipelineOrchestrator, RetryConfig, RunRequest};
use crate::stages::{
    GenerativeCapability, ImageStage, PlaceholderImageCapability, PlaceholderStoryCapability,
    TextStage,
};
use crate::storage::InMemoryArtifactStore;

/// Image prompt from the flipbook demo.
pub const DUCK_IMAGE_PROMPT: &str = "A cheerful duck on a farm";

/// Story prompt from the flipbook demo.
pub const DUCK_STORY_PROMPT: &str = "A duck's farm adventure";

/// The demo parameters: guidance 7.0, adaptation 0.9, 150 units, no seed.
#[must_use]
pub fn duck_params() -> GenerationParameters {
    GenerationParameters::builder(DUCK_IMAGE_PROMPT)
        .guidance_scale(7.0)
        .adaptation_weight(0.9)
        .max_output_units(150)
        .build()
        .unwrap_or_else(|e| panic!("demo parameters are valid: {e}"))
}

/// The demo run request.
#[must_use]
pub fn duck_request() -> RunRequest {
    RunRequest::new(DUCK_IMAGE_PROMPT, DUCK_STORY_PROMPT, &duck_params())
        .unwrap_or_else(|e| panic!("demo request is valid: {e}"))
}

/// A valid image artifact for `params`.
#[must_use]
pub fn sample_image(params: &GenerationParameters) -> Artifact {
    ImageArtifact::new(
        StageFingerprint::compute(StageKind::Image, params),
        "image/png",
        vec![0x89, b'P', b'N', b'G'],
    )
    .with_dimensions(Some(1), Some(1))
    .into()
}

/// A valid story artifact for `params`.
#[must_use]
pub fn sample_story(params: &GenerationParameters, body: &str) -> Artifact {
    TextArtifact::new(StageFingerprint::compute(StageKind::Text, params), body).into()
}

/// An orchestrator with inspectable collaborators.
#[derive(Debug, Clone)]
pub struct TestHarness {
    /// The orchestrator under test.
    pub orchestrator: PipelineOrchestrator,
    /// Its cache.
    pub cache: ArtifactCache,
    /// Its document store.
    pub store: InMemoryArtifactStore,
    /// Every emitted lifecycle event.
    pub events: Arc<CollectingEventSink>,
}

impl TestHarness {
    /// Builds a harness around the given capabilities with instant retries.
    #[must_use]
    pub fn new(
        image: Arc<dyn GenerativeCapability>,
        text: Arc<dyn GenerativeCapability>,
    ) -> Self {
        let store = InMemoryArtifactStore::new();
        let cache = ArtifactCache::new(CacheConfig::default());
        let events = Arc::new(CollectingEventSink::new());
        let orchestrator = PipelineOrchestrator::builder(
            Arc::new(ImageStage::new(image)),
            Arc::new(TextStage::new(text)),
        )
        .cache(cache.clone())
        .store(Arc::new(store.clone()))
        .retry(RetryConfig::immediate(2))
        .event_sink(events.clone())
        .build();

        Self {
            orchestrator,
            cache,
            store,
            events,
        }
    }

    /// A harness over the placeholder capabilities.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::new(
            Arc::new(PlaceholderImageCapability::new()),
            Arc::new(PlaceholderStoryCapability::new()),
        )
    }
}
