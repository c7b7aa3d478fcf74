//! Batch execution over prompt variations.
//!
//! A [`BatchRequest`] names a prompt template and a run count. Planning turns
//! it into a [`BatchJob`] of indexed run requests, each with a variation and
//! seed derived from its index, and the [`BatchRunner`] drives the
//! orchestrator over the job with bounded parallelism.

mod config;
mod job;
mod report;
mod runner;
mod template;

pub use config::{BatchConfig, DEFAULT_BATCH_SEED, DEFAULT_PARALLELISM};
pub use job::{BatchJob, BatchRequest, PlannedRun};
pub use report::{BatchEntry, BatchReport};
pub use runner::BatchRunner;
pub use template::{PromptEnhancement, PromptTemplate};
