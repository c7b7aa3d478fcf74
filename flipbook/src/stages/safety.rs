//! Content-safety hook applied to generated text.

use crate::core::TextArtifact;
use regex::{Regex, RegexBuilder};
use std::fmt::Debug;
use thiserror::Error;

/// Returned by a [`ContentSafetyHook`] that refuses a story.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct RejectedContent {
    /// Why the text was refused.
    pub reason: String,
}

impl RejectedContent {
    /// Creates a rejection.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Screens freshly generated story text before it is cached or compiled.
pub trait ContentSafetyHook: Send + Sync + Debug {
    /// Accepts or rejects the text.
    fn screen(&self, text: &TextArtifact) -> Result<(), RejectedContent>;
}

/// Rejects text containing any blocked term as a whole word, case-insensitively.
#[derive(Debug, Clone)]
pub struct KeywordSafetyFilter {
    pattern: Option<Regex>,
}

impl KeywordSafetyFilter {
    /// Builds a filter from blocked terms. Empty terms are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the combined pattern exceeds regex size limits.
    pub fn new<I, S>(terms: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let escaped: Vec<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .map(|t| regex::escape(&t))
            .collect();

        if escaped.is_empty() {
            return Ok(Self { pattern: None });
        }

        let pattern = RegexBuilder::new(&format!(r"\b(?:{})\b", escaped.join("|")))
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }
}

impl ContentSafetyHook for KeywordSafetyFilter {
    fn screen(&self, text: &TextArtifact) -> Result<(), RejectedContent> {
        let Some(pattern) = &self.pattern else {
            return Ok(());
        };
        match pattern.find(&text.body) {
            Some(found) => Err(RejectedContent::new(format!(
                "blocked term '{}' at offset {}",
                found.as_str(),
                found.start()
            ))),
            None => Ok(()),
        }
    }
}
