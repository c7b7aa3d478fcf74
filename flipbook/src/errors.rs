//! Error types for the flipbook pipeline.
//!
//! Stage-local failures are modelled by [`StageError`] and are caught at the
//! orchestrator boundary, where they become part of a run's terminal state.
//! [`FlipbookError`] is the crate-wide umbrella for everything else.

use crate::core::StageKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// The main error type for flipbook operations outside a single run.
#[derive(Debug, Error)]
pub enum FlipbookError {
    /// Generation parameters failed validation.
    #[error("{0}")]
    InvalidParameter(#[from] InvalidParameterError),

    /// A stage failed.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// The compiler rejected its inputs.
    #[error("{0}")]
    Compile(#[from] CompileError),

    /// The storage boundary failed.
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// Configuration could not be loaded or is invalid.
    #[error("{0}")]
    Config(#[from] crate::config::ConfigError),

    /// A run attempted an illegal state transition.
    #[error("Illegal run transition: {from} -> {to}")]
    InvalidTransition {
        /// The state the run was in.
        from: crate::core::RunState,
        /// The state that was requested.
        to: crate::core::RunState,
    },

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of every failure the pipeline can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input; never retried.
    InvalidParameter,
    /// The underlying model or resource is not loaded.
    CapabilityUnavailable,
    /// The capability exceeded its time budget.
    GenerationTimeout,
    /// The capability returned malformed or empty output.
    InvalidOutput,
    /// Compiler-time contract violation.
    InvalidArtifact,
    /// The content-safety hook rejected generated text.
    RejectedContent,
    /// Cooperative cancellation.
    Cancelled,
    /// The storage collaborator failed.
    Storage,
    /// Orchestration bug or panicked task.
    Internal,
}

impl ErrorKind {
    /// Returns the snake-case name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidParameter => "invalid_parameter",
            Self::CapabilityUnavailable => "capability_unavailable",
            Self::GenerationTimeout => "generation_timeout",
            Self::InvalidOutput => "invalid_output",
            Self::InvalidArtifact => "invalid_artifact",
            Self::RejectedContent => "rejected_content",
            Self::Cancelled => "cancelled",
            Self::Storage => "storage",
            Self::Internal => "internal",
        }
    }

    /// Returns true for transient kinds the orchestrator retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::CapabilityUnavailable | Self::GenerationTimeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a generation parameter violates its constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Invalid parameter '{field}': {constraint}")]
pub struct InvalidParameterError {
    /// The offending field.
    pub field: String,
    /// The violated constraint.
    pub constraint: String,
}

impl InvalidParameterError {
    /// Creates a new invalid parameter error.
    #[must_use]
    pub fn new(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
        }
    }
}

/// A typed failure produced by a stage adapter or the stage pipeline around it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// Parameters were rejected before the capability was invoked.
    #[error("{0}")]
    InvalidParameter(#[from] InvalidParameterError),

    /// The capability is not loaded or reachable.
    #[error("{stage} capability unavailable: {reason}")]
    CapabilityUnavailable {
        /// The stage that failed.
        stage: StageKind,
        /// Reason reported by the capability.
        reason: String,
    },

    /// The capability exceeded its time budget.
    #[error("{stage} generation timed out after {timeout_ms}ms")]
    GenerationTimeout {
        /// The stage that failed.
        stage: StageKind,
        /// The budget that was exceeded.
        timeout_ms: u64,
    },

    /// The capability returned unusable output.
    #[error("{stage} produced invalid output: {reason}")]
    InvalidOutput {
        /// The stage that failed.
        stage: StageKind,
        /// What was wrong with the output.
        reason: String,
    },

    /// The content-safety hook rejected the output.
    #[error("{stage} content rejected: {reason}")]
    RejectedContent {
        /// The stage whose output was rejected.
        stage: StageKind,
        /// The hook's reason.
        reason: String,
    },

    /// The stage was cancelled before it produced a result.
    #[error("{stage} stage cancelled")]
    Cancelled {
        /// The stage that was cancelled.
        stage: StageKind,
    },
}

impl StageError {
    /// Creates a capability unavailable error.
    #[must_use]
    pub fn unavailable(stage: StageKind, reason: impl Into<String>) -> Self {
        Self::CapabilityUnavailable {
            stage,
            reason: reason.into(),
        }
    }

    /// Creates an invalid output error.
    #[must_use]
    pub fn invalid_output(stage: StageKind, reason: impl Into<String>) -> Self {
        Self::InvalidOutput {
            stage,
            reason: reason.into(),
        }
    }

    /// Creates a rejected content error.
    #[must_use]
    pub fn rejected(stage: StageKind, reason: impl Into<String>) -> Self {
        Self::RejectedContent {
            stage,
            reason: reason.into(),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
            Self::CapabilityUnavailable { .. } => ErrorKind::CapabilityUnavailable,
            Self::GenerationTimeout { .. } => ErrorKind::GenerationTimeout,
            Self::InvalidOutput { .. } => ErrorKind::InvalidOutput,
            Self::RejectedContent { .. } => ErrorKind::RejectedContent,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Returns the stage that raised the error, when known.
    #[must_use]
    pub const fn stage(&self) -> Option<StageKind> {
        match self {
            Self::InvalidParameter(_) => None,
            Self::CapabilityUnavailable { stage, .. }
            | Self::GenerationTimeout { stage, .. }
            | Self::InvalidOutput { stage, .. }
            | Self::RejectedContent { stage, .. }
            | Self::Cancelled { stage } => Some(*stage),
        }
    }

    /// Returns true if the error is transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind().as_str()));
        if let Some(stage) = self.stage() {
            map.insert("stage".to_string(), serde_json::json!(stage.as_str()));
        }
        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Errors raised by the flipbook compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// An input artifact was invalid or of the wrong kind.
    #[error("Invalid {role} artifact: {reason}")]
    InvalidArtifact {
        /// Which input slot was rejected ("image" or "story").
        role: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A hotspot could not be encoded.
    #[error("Hotspot encoding failed: {0}")]
    Encoding(String),
}

impl CompileError {
    /// Creates an invalid artifact error.
    #[must_use]
    pub fn invalid_artifact(role: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArtifact {
            role: role.into(),
            reason: reason.into(),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArtifact { .. } => ErrorKind::InvalidArtifact,
            Self::Encoding(_) => ErrorKind::Internal,
        }
    }
}

/// Errors raised by the storage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// No bytes stored under the key.
    #[error("Storage key not found: {0}")]
    NotFound(String),

    /// The key cannot be mapped onto the backend.
    #[error("Invalid storage key '{key}': {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The stored bytes no longer match their recorded hash.
    #[error("Content hash mismatch for '{key}': expected {expected}, got {actual}")]
    HashMismatch {
        /// The key that was read.
        key: String,
        /// Hash recorded in the handle.
        expected: String,
        /// Hash of the bytes read.
        actual: String,
    },

    /// The backend failed.
    #[error("Storage backend error for '{key}': {message}")]
    Backend {
        /// The key being accessed.
        key: String,
        /// Backend message.
        message: String,
    },
}

impl StorageError {
    /// Creates a backend error.
    #[must_use]
    pub fn backend(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            key: key.into(),
            message: message.into(),
        }
    }
}
