//! Batch runner settings.

use serde::{Deserialize, Serialize};

/// Runs executed at once by default.
pub const DEFAULT_PARALLELISM: usize = 2;

/// Seed for variation choice used by the character generator demo.
pub const DEFAULT_BATCH_SEED: u64 = 42;

/// Settings shared by every batch a runner executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum concurrent runs.
    pub parallelism: usize,
    /// Variation suffixes chosen per index.
    pub variations: Vec<String>,
    /// Seed for choosing variations.
    pub seed: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            variations: ["smiling", "waving", "laughing"]
                .into_iter()
                .map(String::from)
                .collect(),
            seed: DEFAULT_BATCH_SEED,
        }
    }
}

impl BatchConfig {
    /// Sets the parallelism bound.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Replaces the variation set.
    #[must_use]
    pub fn with_variations<I, S>(mut self, variations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variations = variations.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the variation seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
