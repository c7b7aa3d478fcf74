//! Stage kind, stage status, and run state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The generative capability a stage wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Image synthesis.
    Image,
    /// Story (text) synthesis.
    Text,
}

impl StageKind {
    /// Returns the stable lowercase name used in fingerprints and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one stage inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not started yet.
    #[default]
    Pending,
    /// Generating (or waiting on an in-flight computation).
    Running,
    /// Produced a valid artifact.
    Succeeded,
    /// Failed after any retries.
    Failed,
    /// Dropped by cancellation.
    Cancelled,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status will not change again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// State machine of a pipeline run.
///
/// ```text
/// Pending -> Generating -> Compiling -> Done
///    \            \            \
///     +-> Failed   +-> Failed   +-> Failed
///     +-> Cancelled+-> Cancelled
/// ```
///
/// Image and text generation both happen while the run is `Generating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Created, nothing started.
    #[default]
    Pending,
    /// Image and text stages in progress.
    Generating,
    /// Both artifacts valid, document being assembled.
    Compiling,
    /// Document compiled and stored.
    Done,
    /// Terminal failure.
    Failed,
    /// Cancelled before compilation.
    Cancelled,
}

impl RunState {
    /// Returns true for `Done`, `Failed`, and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Returns true if `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Generating)
            | (Self::Generating, Self::Compiling)
            | (Self::Compiling, Self::Done) => true,
            (Self::Pending | Self::Generating, Self::Cancelled) => true,
            (Self::Pending | Self::Generating | Self::Compiling, Self::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Generating => write!(f, "GENERATING"),
            Self::Compiling => write!(f, "COMPILING"),
            Self::Done => write!(f, "DONE"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Image.to_string(), "image");
        assert_eq!(StageKind::Text.to_string(), "text");
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(RunState::Pending.can_transition_to(RunState::Generating));
        assert!(RunState::Generating.can_transition_to(RunState::Compiling));
        assert!(RunState::Compiling.can_transition_to(RunState::Done));
    }

    #[test]
    fn test_failed_reachable_from_every_non_terminal_state() {
        for state in [RunState::Pending, RunState::Generating, RunState::Compiling] {
            assert!(state.can_transition_to(RunState::Failed), "{state}");
        }
    }

    #[test]
    fn test_cancel_only_before_compiling() {
        assert!(RunState::Pending.can_transition_to(RunState::Cancelled));
        assert!(RunState::Generating.can_transition_to(RunState::Cancelled));
        assert!(!RunState::Compiling.can_transition_to(RunState::Cancelled));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [RunState::Done, RunState::Failed, RunState::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                RunState::Pending,
                RunState::Generating,
                RunState::Compiling,
                RunState::Done,
                RunState::Failed,
                RunState::Cancelled,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_no_skipping_generation() {
        assert!(!RunState::Pending.can_transition_to(RunState::Compiling));
        assert!(!RunState::Generating.can_transition_to(RunState::Done));
    }

    #[test]
    fn test_run_state_serialize() {
        let json = serde_json::to_string(&RunState::Generating).unwrap();
        assert_eq!(json, r#""GENERATING""#);

        let kind = serde_json::to_string(&StageKind::Text).unwrap();
        assert_eq!(kind, r#""text""#);
    }
}
