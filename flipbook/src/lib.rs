//! # Flipbook
//!
//! Offline generation of interactive picture-book pages.
//!
//! A run takes an image prompt and a story prompt, generates both artifacts
//! concurrently, and compiles them into a single self-contained HTML document
//! with tappable hotspots. The crate provides:
//!
//! - **Stages**: image and text adapters over pluggable generative capabilities
//! - **Artifact cache**: fingerprint-keyed, single-flight, with pinned entries
//! - **Orchestration**: a run state machine with retries and cancellation
//! - **Compilation**: deterministic document rendering with escaped content
//! - **Batches**: templated prompt variations executed with bounded parallelism
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flipbook::prelude::*;
//! use std::sync::Arc;
//!
//! let orchestrator = PipelineOrchestrator::builder(
//!     Arc::new(ImageStage::new(Arc::new(PlaceholderImageCapability::new()))),
//!     Arc::new(TextStage::new(Arc::new(PlaceholderStoryCapability::new()))),
//! )
//! .build();
//!
//! let params = GenerationParameters::builder("A cheerful duck on a farm").build()?;
//! let request = RunRequest::new("A cheerful duck on a farm", "A duck's farm adventure", &params)?;
//! let run = orchestrator.run(request).await;
//! assert_eq!(run.state(), RunState::Done);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod batch;
pub mod cache;
pub mod cancellation;
pub mod compiler;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod storage;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::batch::{BatchConfig, BatchReport, BatchRequest, BatchRunner, PromptTemplate};
    pub use crate::cache::{ArtifactCache, CacheConfig, CacheOutcome, CachePolicy};
    pub use crate::cancellation::CancellationToken;
    pub use crate::compiler::{FlipbookCompiler, FlipbookDocument, Hotspot};
    pub use crate::config::FlipbookConfig;
    pub use crate::core::{
        Artifact, GenerationParameters, RunState, StageFingerprint, StageKind, StageStatus,
    };
    pub use crate::errors::{FlipbookError, InvalidParameterError, StageError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        PipelineOrchestrator, PipelineRun, RetryConfig, RunFailure, RunOutcome, RunRequest,
    };
    pub use crate::stages::{
        GenerativeCapability, ImageStage, PlaceholderImageCapability, PlaceholderStoryCapability,
        TextStage,
    };
    pub use crate::storage::{ArtifactStore, FileSystemArtifactStore, InMemoryArtifactStore};
}
