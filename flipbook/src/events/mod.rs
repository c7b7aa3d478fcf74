//! Lifecycle events for pipeline runs.
//!
//! The orchestrator reports run and stage lifecycle through an [`EventSink`]
//! handed to it at construction. Sinks are fire-and-forget: they never fail
//! a run.

mod sink;

pub use sink::{CollectingEventSink, Event, EventSink, LoggingEventSink, NoOpEventSink};

/// A run was accepted and is about to start generating.
pub const RUN_STARTED: &str = "run.started";

/// A run moved to a new state.
pub const RUN_STATE_CHANGED: &str = "run.state_changed";

/// A stage produced a valid artifact.
pub const STAGE_COMPLETED: &str = "stage.completed";

/// A stage failed after any retries.
pub const STAGE_FAILED: &str = "stage.failed";

/// A run reached a terminal state.
pub const RUN_FINISHED: &str = "run.finished";
