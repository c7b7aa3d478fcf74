//! Cache configuration, policies, and counters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default capacity in entries.
pub const DEFAULT_MAX_ENTRIES: usize = 256;

/// Capacity limits for an [`ArtifactCache`](super::ArtifactCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of stored artifacts.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Optional bound on the summed payload size.
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: None,
        }
    }
}

impl CacheConfig {
    /// Creates a config bounded by entry count only.
    #[must_use]
    pub const fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries,
            max_bytes: None,
        }
    }

    /// Adds a byte bound.
    #[must_use]
    pub const fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }
}

/// How a lookup treats existing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Reuse stored or in-flight results.
    #[default]
    UseCache,
    /// Always recompute and replace the stored entry.
    ForceFresh,
}

/// How a lookup obtained its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    /// Served from a stored entry.
    Hit,
    /// Computed by this caller.
    Miss,
    /// Received from another caller's in-flight computation.
    Joined,
    /// Computed under [`CachePolicy::ForceFresh`].
    Bypassed,
}

impl CacheOutcome {
    /// Returns true if the artifact was computed by this caller.
    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        matches!(self, Self::Miss | Self::Bypassed)
    }
}

impl fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "hit"),
            Self::Miss => write!(f, "miss"),
            Self::Joined => write!(f, "joined"),
            Self::Bypassed => write!(f, "bypassed"),
        }
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups served from a stored entry.
    pub hits: u64,
    /// Computations led by a caller.
    pub misses: u64,
    /// Lookups that joined an in-flight computation.
    pub joins: u64,
    /// Forced recomputations.
    pub bypasses: u64,
    /// Computations that failed.
    pub failures: u64,
    /// Entries evicted for capacity.
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that avoided a computation.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let reused = self.hits + self.joins;
        let total = reused + self.misses + self.bypasses;
        if total == 0 {
            0.0
        } else {
            reused as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: CacheConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.max_entries, DEFAULT_MAX_ENTRIES);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 2,
            joins: 1,
            misses: 1,
            ..CacheStats::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_outcome_is_fresh() {
        assert!(CacheOutcome::Miss.is_fresh());
        assert!(CacheOutcome::Bypassed.is_fresh());
        assert!(!CacheOutcome::Hit.is_fresh());
        assert!(!CacheOutcome::Joined.is_fresh());
    }
}
