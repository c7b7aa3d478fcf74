//! Fingerprint-keyed artifact cache.
//!
//! The cache is the only shared mutable state in the pipeline. Its
//! [`ArtifactCache::get_or_compute`] entry point guarantees at most one
//! concurrent computation per fingerprint: concurrent callers join the
//! in-flight computation and receive its result, success or failure.
//! Failures are never stored. Entries are evicted least recently used first,
//! skipping entries pinned by a live [`PinnedArtifact`].

mod config;
mod pin;
mod store;

pub use config::{CacheConfig, CacheOutcome, CachePolicy, CacheStats, DEFAULT_MAX_ENTRIES};
pub use pin::PinnedArtifact;
pub use store::{ArtifactCache, CacheLookup};
