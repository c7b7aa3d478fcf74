//! Testing utilities for flipbook pipelines.
//!
//! This module provides:
//! - Mock capabilities (scripted, closure-backed, and gated)
//! - Demo fixtures and a pipeline test harness
//! - Assertions over finished runs

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_cache_outcome, assert_run_done, assert_run_failed, assert_stage_status,
    assert_state_sequence,
};
pub use fixtures::{
    duck_params, duck_request, sample_image, sample_story, TestHarness, DUCK_IMAGE_PROMPT,
    DUCK_STORY_PROMPT,
};
pub use mocks::{FnCapability, GatedCapability, ScriptedCapability};
