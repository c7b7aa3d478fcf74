//! Core domain model types.
//!
//! This module contains the fundamental types used throughout the pipeline:
//! - Stage kind, stage status, and run state enums
//! - Validated generation parameters
//! - Stage fingerprints
//! - Typed artifacts

mod artifact;
mod fingerprint;
mod params;
mod status;

pub use artifact::{Artifact, ArtifactMeta, ImageArtifact, TextArtifact};
pub use fingerprint::{canonical_document, hash_hex, StageFingerprint};
pub use params::{
    GenerationParameters, GenerationParametersBuilder, NumericParams, ADAPTATION_WEIGHT_RANGE,
    DEFAULT_ADAPTATION_WEIGHT, DEFAULT_GUIDANCE_SCALE, DEFAULT_MAX_OUTPUT_UNITS,
    GUIDANCE_SCALE_RANGE,
};
pub use status::{RunState, StageKind, StageStatus};
