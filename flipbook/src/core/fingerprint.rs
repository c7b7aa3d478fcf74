//! Deterministic stage fingerprints used as cache keys.

use super::{GenerationParameters, StageKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Bumped whenever the canonical document layout changes.
const FINGERPRINT_VERSION: u32 = 1;

/// Deterministic key over `(stage kind, parameters)`.
///
/// The key is the hex SHA-256 of a canonical JSON document with sorted keys,
/// so it is stable across process restarts and platforms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageFingerprint(String);

impl StageFingerprint {
    /// Computes the fingerprint for a stage invocation.
    #[must_use]
    pub fn compute(stage: StageKind, params: &GenerationParameters) -> Self {
        Self(hash_hex(canonical_document(stage, params).as_bytes()))
    }

    /// Wraps an already-computed hex digest.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The full hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first 12 hex characters, for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for StageFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the canonical JSON document hashed into a fingerprint.
#[must_use]
pub fn canonical_document(stage: StageKind, params: &GenerationParameters) -> String {
    let mut doc: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
    doc.insert("v", serde_json::json!(FINGERPRINT_VERSION));
    doc.insert("stage", serde_json::json!(stage.as_str()));
    doc.insert("prompt", serde_json::json!(params.prompt_text()));
    doc.insert("guidance_scale", serde_json::json!(params.guidance_scale()));
    doc.insert("adaptation_weight", serde_json::json!(params.adaptation_weight()));
    doc.insert("max_output_units", serde_json::json!(params.max_output_units()));
    doc.insert("seed", serde_json::json!(params.seed()));

    // A BTreeMap of JSON values always serializes.
    serde_json::to_string(&doc).unwrap_or_default()
}

/// Hex SHA-256 of arbitrary bytes.
#[must_use]
pub fn hash_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn duck() -> GenerationParameters {
        GenerationParameters::builder("A cheerful duck on a farm")
            .guidance_scale(7.0)
            .adaptation_weight(0.9)
            .max_output_units(150)
            .build()
            .unwrap()
    }

    #[test]
    fn test_canonical_document_sorted() {
        assert_eq!(
            canonical_document(StageKind::Image, &duck()),
            r#"{"adaptation_weight":0.9,"guidance_scale":7.0,"max_output_units":150,"prompt":"A cheerful duck on a farm","seed":null,"stage":"image","v":1}"#
        );
    }

    #[test]
    fn test_fingerprint_is_stable_across_processes() {
        // Pinned value: a change here invalidates every persisted cache key.
        assert_eq!(
            StageFingerprint::compute(StageKind::Image, &duck()).as_str(),
            "1d32e2a44c0755629df991c4daea33bb2f1de6a12e45662261588d4f84c3e827"
        );
        assert_eq!(
            StageFingerprint::compute(StageKind::Text, &duck()).as_str(),
            "deee8d27173c24d7bc421b5173e24f5027eedd69b2f0412bd031dd7dbe06e120"
        );
    }

    #[test]
    fn test_equal_inputs_equal_fingerprints() {
        let a = StageFingerprint::compute(StageKind::Text, &duck());
        let b = StageFingerprint::compute(StageKind::Text, &duck());
        assert_eq!(a, b);
    }

    #[test]
    fn test_signed_zero_weights_share_a_fingerprint() {
        let positive = GenerationParameters::builder("duck")
            .adaptation_weight(0.0)
            .build()
            .unwrap();
        let negative = GenerationParameters::builder("duck")
            .adaptation_weight(-0.0)
            .build()
            .unwrap();
        assert_eq!(positive, negative);
        assert_eq!(
            StageFingerprint::compute(StageKind::Image, &positive),
            StageFingerprint::compute(StageKind::Image, &negative)
        );
    }

    #[test]
    fn test_stage_kind_changes_fingerprint() {
        let image = StageFingerprint::compute(StageKind::Image, &duck());
        let text = StageFingerprint::compute(StageKind::Text, &duck());
        assert_ne!(image, text);
    }

    #[test]
    fn test_every_field_contributes() {
        let base = StageFingerprint::compute(StageKind::Image, &duck());
        let variants = [
            duck().with_prompt("A grumpy goose").unwrap(),
            duck().to_builder().guidance_scale(7.5).build().unwrap(),
            duck().to_builder().adaptation_weight(0.5).build().unwrap(),
            duck().to_builder().max_output_units(151).build().unwrap(),
            duck().with_seed(Some(42)),
        ];
        for params in variants {
            assert_ne!(base, StageFingerprint::compute(StageKind::Image, &params));
        }
    }

    #[test]
    fn test_short_prefix() {
        let fp = StageFingerprint::compute(StageKind::Image, &duck());
        assert_eq!(fp.short(), "1d32e2a44c07");
    }
}
