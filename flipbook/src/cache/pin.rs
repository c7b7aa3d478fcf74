//! Pin guards for cached artifacts.

use super::store::CacheInner;
use crate::core::{Artifact, StageFingerprint};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// A cached artifact that cannot be evicted while this guard lives.
///
/// Dropping the guard releases the pin.
pub struct PinnedArtifact {
    artifact: Arc<Artifact>,
    fingerprint: StageFingerprint,
    cache: Arc<CacheInner>,
}

impl PinnedArtifact {
    /// Caller must already have incremented the pin count for `fingerprint`.
    pub(super) fn new(
        artifact: Arc<Artifact>,
        fingerprint: StageFingerprint,
        cache: Arc<CacheInner>,
    ) -> Self {
        Self {
            artifact,
            fingerprint,
            cache,
        }
    }

    /// The shared artifact.
    #[must_use]
    pub fn artifact(&self) -> &Arc<Artifact> {
        &self.artifact
    }

    /// The fingerprint the artifact is cached under.
    #[must_use]
    pub fn fingerprint(&self) -> &StageFingerprint {
        &self.fingerprint
    }

    /// Releases the pin and keeps the artifact.
    #[must_use]
    pub fn release(self) -> Arc<Artifact> {
        Arc::clone(&self.artifact)
    }
}

impl Deref for PinnedArtifact {
    type Target = Artifact;

    fn deref(&self) -> &Artifact {
        &self.artifact
    }
}

impl Clone for PinnedArtifact {
    fn clone(&self) -> Self {
        self.cache.pin(&self.fingerprint);
        Self::new(
            Arc::clone(&self.artifact),
            self.fingerprint.clone(),
            Arc::clone(&self.cache),
        )
    }
}

impl Drop for PinnedArtifact {
    fn drop(&mut self) {
        self.cache.unpin(&self.fingerprint);
    }
}

impl fmt::Debug for PinnedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedArtifact")
            .field("fingerprint", &self.fingerprint.short())
            .field("kind", &self.artifact.kind())
            .finish()
    }
}
