//! The single-flight LRU artifact cache.

use super::{CacheConfig, CacheOutcome, CachePolicy, CacheStats, PinnedArtifact};
use crate::core::{Artifact, StageFingerprint};
use crate::errors::StageError;
use crate::storage::ArtifactStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Result broadcast by the leader of an in-flight computation.
#[derive(Debug, Clone)]
enum Flight {
    Running,
    Done(Result<Arc<Artifact>, StageError>),
}

#[derive(Debug)]
struct Entry {
    artifact: Arc<Artifact>,
    size_bytes: u64,
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<StageFingerprint, Entry>,
    in_flight: HashMap<StageFingerprint, (u64, watch::Receiver<Flight>)>,
    pins: HashMap<StageFingerprint, usize>,
    waiting: usize,
    tick: u64,
    next_flight: u64,
    total_bytes: u64,
    stats: CacheStats,
}

impl CacheState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn pin(&mut self, fingerprint: &StageFingerprint) {
        *self.pins.entry(fingerprint.clone()).or_insert(0) += 1;
    }

    fn is_pinned(&self, fingerprint: &StageFingerprint) -> bool {
        self.pins.get(fingerprint).is_some_and(|count| *count > 0)
    }

    fn insert(&mut self, fingerprint: StageFingerprint, artifact: Arc<Artifact>) {
        let size_bytes = artifact.size_bytes();
        let last_used = self.next_tick();
        if let Some(old) = self.entries.insert(
            fingerprint,
            Entry {
                artifact,
                size_bytes,
                last_used,
            },
        ) {
            self.total_bytes -= old.size_bytes;
        }
        self.total_bytes += size_bytes;
    }

    fn remove(&mut self, fingerprint: &StageFingerprint) -> bool {
        match self.entries.remove(fingerprint) {
            Some(old) => {
                self.total_bytes -= old.size_bytes;
                true
            }
            None => false,
        }
    }

    fn over_capacity(&self, config: &CacheConfig) -> bool {
        self.entries.len() > config.max_entries
            || config.max_bytes.is_some_and(|max| self.total_bytes > max)
    }

    /// Evicts least recently used unpinned entries until within bounds.
    fn evict(&mut self, config: &CacheConfig) {
        while self.over_capacity(config) {
            let victim = self
                .entries
                .iter()
                .filter(|(fingerprint, _)| !self.is_pinned(fingerprint))
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(fingerprint, _)| fingerprint.clone());

            let Some(victim) = victim else {
                // Everything left is pinned; retry when a pin is released.
                break;
            };
            self.remove(&victim);
            self.stats.evictions += 1;
            tracing::debug!(fingerprint = victim.short(), "Evicted cache entry");
        }
    }
}

pub(super) struct CacheInner {
    config: CacheConfig,
    state: Mutex<CacheState>,
    store: Option<Arc<dyn ArtifactStore>>,
}

impl CacheInner {
    pub(super) fn pin(&self, fingerprint: &StageFingerprint) {
        self.state.lock().pin(fingerprint);
    }

    pub(super) fn unpin(&self, fingerprint: &StageFingerprint) {
        let mut state = self.state.lock();
        if let Some(count) = state.pins.get_mut(fingerprint) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.pins.remove(fingerprint);
            }
        }
        state.evict(&self.config);
    }
}

/// A lookup result: the pinned artifact and how it was obtained.
#[derive(Debug)]
pub struct CacheLookup {
    /// The artifact, pinned until dropped.
    pub artifact: PinnedArtifact,
    /// Hit, miss, joined, or bypassed.
    pub outcome: CacheOutcome,
}

enum Role {
    Hit(PinnedArtifact),
    Follow(watch::Receiver<Flight>, WaitGuard),
    Lead(FlightGuard),
}

/// Counts a caller blocked on another caller's computation.
struct WaitGuard {
    cache: Arc<CacheInner>,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        let mut state = self.cache.state.lock();
        state.waiting = state.waiting.saturating_sub(1);
    }
}

/// Leadership of one in-flight computation.
///
/// Dropping the guard without completing (the leader was cancelled) removes
/// the in-flight marker and closes the channel, so a waiter takes over.
struct FlightGuard {
    cache: Arc<CacheInner>,
    fingerprint: StageFingerprint,
    id: u64,
    sender: Option<watch::Sender<Flight>>,
}

impl FlightGuard {
    fn clear_marker(&self, state: &mut CacheState) {
        if state
            .in_flight
            .get(&self.fingerprint)
            .is_some_and(|(id, _)| *id == self.id)
        {
            state.in_flight.remove(&self.fingerprint);
        }
    }

    /// Stores a success, pins it for the leader, and wakes followers.
    fn succeed(mut self, artifact: Arc<Artifact>) -> PinnedArtifact {
        {
            let mut state = self.cache.state.lock();
            self.clear_marker(&mut state);
            state.insert(self.fingerprint.clone(), Arc::clone(&artifact));
            state.pin(&self.fingerprint);
            state.stats.misses += 1;
            state.evict(&self.cache.config);
        }
        if let Some(sender) = self.sender.take() {
            sender.send_replace(Flight::Done(Ok(Arc::clone(&artifact))));
        }
        PinnedArtifact::new(artifact, self.fingerprint.clone(), Arc::clone(&self.cache))
    }

    /// Broadcasts a failure without storing anything.
    fn fail(mut self, error: &StageError) {
        {
            let mut state = self.cache.state.lock();
            self.clear_marker(&mut state);
            state.stats.misses += 1;
            state.stats.failures += 1;
        }
        if let Some(sender) = self.sender.take() {
            sender.send_replace(Flight::Done(Err(error.clone())));
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if self.sender.is_some() {
            let mut state = self.cache.state.lock();
            self.clear_marker(&mut state);
            tracing::debug!(
                fingerprint = self.fingerprint.short(),
                "In-flight computation abandoned"
            );
        }
    }
}

/// Fingerprint-keyed, single-flight, LRU artifact cache.
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct ArtifactCache {
    inner: Arc<CacheInner>,
}

impl ArtifactCache {
    /// Creates an in-memory cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                config,
                state: Mutex::new(CacheState::default()),
                store: None,
            }),
        }
    }

    /// Creates a cache that also persists fresh payloads under `artifact/<fingerprint>`.
    #[must_use]
    pub fn with_store(config: CacheConfig, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                config,
                state: Mutex::new(CacheState::default()),
                store: Some(store),
            }),
        }
    }

    /// The capacity limits.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Returns the artifact for `fingerprint`, computing it at most once
    /// across concurrent callers.
    ///
    /// `compute` runs only when this caller leads the computation. Its error
    /// is returned to the leader and every joined waiter, and nothing is
    /// stored. Under [`CachePolicy::ForceFresh`] the lookup and any
    /// in-flight computation are ignored and the result replaces the entry.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: &StageFingerprint,
        policy: CachePolicy,
        compute: F,
    ) -> Result<CacheLookup, StageError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Artifact, StageError>>,
    {
        if policy == CachePolicy::ForceFresh {
            return self.compute_fresh(fingerprint, compute).await;
        }

        let guard = loop {
            match self.claim(fingerprint) {
                Role::Hit(artifact) => {
                    return Ok(CacheLookup {
                        artifact,
                        outcome: CacheOutcome::Hit,
                    });
                }
                Role::Follow(mut receiver, waiting) => {
                    let settled = receiver
                        .wait_for(|flight| matches!(flight, Flight::Done(_)))
                        .await
                        .map(|flight| flight.clone());
                    drop(waiting);
                    match settled {
                        Ok(Flight::Done(Ok(artifact))) => {
                            let pinned = {
                                let mut state = self.inner.state.lock();
                                state.pin(fingerprint);
                                state.stats.joins += 1;
                                PinnedArtifact::new(
                                    artifact,
                                    fingerprint.clone(),
                                    Arc::clone(&self.inner),
                                )
                            };
                            return Ok(CacheLookup {
                                artifact: pinned,
                                outcome: CacheOutcome::Joined,
                            });
                        }
                        Ok(Flight::Done(Err(error))) => return Err(error),
                        // The leader was dropped before finishing; claim again.
                        Ok(Flight::Running) | Err(_) => continue,
                    }
                }
                Role::Lead(guard) => break guard,
            }
        };

        tracing::debug!(fingerprint = fingerprint.short(), "Cache miss, computing");
        match self.produce(fingerprint, compute).await {
            Ok(artifact) => Ok(CacheLookup {
                artifact: guard.succeed(Arc::new(artifact)),
                outcome: CacheOutcome::Miss,
            }),
            Err(error) => {
                guard.fail(&error);
                Err(error)
            }
        }
    }

    fn claim(&self, fingerprint: &StageFingerprint) -> Role {
        let mut state = self.inner.state.lock();

        let tick = state.next_tick();
        if let Some(entry) = state.entries.get_mut(fingerprint) {
            entry.last_used = tick;
            let artifact = Arc::clone(&entry.artifact);
            state.pin(fingerprint);
            state.stats.hits += 1;
            return Role::Hit(PinnedArtifact::new(
                artifact,
                fingerprint.clone(),
                Arc::clone(&self.inner),
            ));
        }

        if let Some((_, receiver)) = state.in_flight.get(fingerprint) {
            let receiver = receiver.clone();
            state.waiting += 1;
            return Role::Follow(
                receiver,
                WaitGuard {
                    cache: Arc::clone(&self.inner),
                },
            );
        }

        state.next_flight += 1;
        let id = state.next_flight;
        let (sender, receiver) = watch::channel(Flight::Running);
        state.in_flight.insert(fingerprint.clone(), (id, receiver));
        Role::Lead(FlightGuard {
            cache: Arc::clone(&self.inner),
            fingerprint: fingerprint.clone(),
            id,
            sender: Some(sender),
        })
    }

    async fn compute_fresh<F, Fut>(
        &self,
        fingerprint: &StageFingerprint,
        compute: F,
    ) -> Result<CacheLookup, StageError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Artifact, StageError>>,
    {
        tracing::debug!(fingerprint = fingerprint.short(), "Bypassing cache");
        let result = self.produce(fingerprint, compute).await;

        let mut state = self.inner.state.lock();
        state.stats.bypasses += 1;
        match result {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                state.insert(fingerprint.clone(), Arc::clone(&artifact));
                state.pin(fingerprint);
                state.evict(&self.inner.config);
                Ok(CacheLookup {
                    artifact: PinnedArtifact::new(
                        artifact,
                        fingerprint.clone(),
                        Arc::clone(&self.inner),
                    ),
                    outcome: CacheOutcome::Bypassed,
                })
            }
            Err(error) => {
                state.stats.failures += 1;
                Err(error)
            }
        }
    }

    /// Runs `compute` and persists the payload when a store is configured.
    async fn produce<F, Fut>(
        &self,
        fingerprint: &StageFingerprint,
        compute: F,
    ) -> Result<Artifact, StageError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Artifact, StageError>>,
    {
        let artifact = compute().await?;

        let Some(store) = &self.inner.store else {
            return Ok(artifact);
        };
        let key = format!("artifact/{fingerprint}");
        match store.put(&key, artifact.payload()).await {
            Ok(handle) => Ok(artifact.with_storage(handle)),
            Err(error) => {
                tracing::warn!(
                    fingerprint = fingerprint.short(),
                    error = %error,
                    "Failed to persist artifact, keeping it in memory only"
                );
                Ok(artifact)
            }
        }
    }

    /// Returns a stored artifact without pinning it or touching recency.
    #[must_use]
    pub fn peek(&self, fingerprint: &StageFingerprint) -> Option<Arc<Artifact>> {
        self.inner
            .state
            .lock()
            .entries
            .get(fingerprint)
            .map(|entry| Arc::clone(&entry.artifact))
    }

    /// Returns true if an entry is stored for `fingerprint`.
    #[must_use]
    pub fn contains(&self, fingerprint: &StageFingerprint) -> bool {
        self.inner.state.lock().entries.contains_key(fingerprint)
    }

    /// Removes an entry. Holders of pinned copies keep their artifact.
    pub fn invalidate(&self, fingerprint: &StageFingerprint) -> bool {
        self.inner.state.lock().remove(fingerprint)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.entries.clear();
        state.total_bytes = 0;
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summed payload size of stored entries.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.inner.state.lock().total_bytes
    }

    /// Number of live pins across all fingerprints.
    #[must_use]
    pub fn pinned_count(&self) -> usize {
        self.inner.state.lock().pins.values().sum()
    }

    /// Number of computations currently in flight.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    /// Number of callers currently waiting on an in-flight computation.
    #[must_use]
    pub fn waiting_count(&self) -> usize {
        self.inner.state.lock().waiting
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.inner.state.lock().stats
    }
}

impl Default for ArtifactCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl fmt::Debug for ArtifactCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ArtifactCache")
            .field("config", &self.inner.config)
            .field("entries", &state.entries.len())
            .field("in_flight", &state.in_flight.len())
            .field("persistent", &self.inner.store.is_some())
            .finish()
    }
}
