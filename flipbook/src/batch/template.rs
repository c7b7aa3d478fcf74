//! Prompt templates and enhancement.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Quality keywords appended to image prompts.
pub const DEFAULT_QUALITY_SUFFIX: &str = "highly detailed, 4k resolution, soft lighting";

/// Elements the image model is asked to avoid.
pub const DEFAULT_NEGATIVE_PROMPT: &str = "blurry, low quality, dark shadows";

/// Keywords added to image prompts for better output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptEnhancement {
    /// Appended after a comma.
    pub quality_suffix: String,
    /// Appended as `--negative_prompt <text>`; empty disables it.
    pub negative_prompt: String,
}

impl Default for PromptEnhancement {
    fn default() -> Self {
        Self {
            quality_suffix: DEFAULT_QUALITY_SUFFIX.to_string(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
        }
    }
}

impl PromptEnhancement {
    /// Applies the enhancement to `prompt`.
    #[must_use]
    pub fn apply(&self, prompt: &str) -> String {
        let mut enhanced = prompt.to_string();
        if !self.quality_suffix.trim().is_empty() {
            enhanced.push_str(", ");
            enhanced.push_str(self.quality_suffix.trim());
        }
        if !self.negative_prompt.trim().is_empty() {
            enhanced.push_str(" --negative_prompt ");
            enhanced.push_str(self.negative_prompt.trim());
        }
        enhanced
    }
}

/// Base prompts shared by every run of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Image prompt before variation.
    pub image: String,
    /// Story prompt before variation.
    pub story: String,
}

impl PromptTemplate {
    /// Creates a template.
    #[must_use]
    pub fn new(image: impl Into<String>, story: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            story: story.into(),
        }
    }

    /// Picks the variation for `index`, reproducibly for a given seed.
    #[must_use]
    pub fn choose_variation(variations: &[String], seed: u64, index: usize) -> Option<&str> {
        let mut rng = StdRng::seed_from_u64(seed ^ index as u64);
        variations.choose(&mut rng).map(String::as_str)
    }

    /// Appends `, <variation>` to `base`.
    #[must_use]
    pub fn vary(base: &str, variation: Option<&str>) -> String {
        match variation {
            Some(variation) => format!("{base}, {variation}"),
            None => base.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn variations() -> Vec<String> {
        vec!["smiling".into(), "waving".into(), "laughing".into()]
    }

    #[test]
    fn test_enhancement_matches_demo() {
        assert_eq!(
            PromptEnhancement::default().apply("Uncle Roggers"),
            "Uncle Roggers, highly detailed, 4k resolution, soft lighting --negative_prompt blurry, low quality, dark shadows"
        );
    }

    #[test]
    fn test_empty_enhancement_is_identity() {
        let none = PromptEnhancement {
            quality_suffix: String::new(),
            negative_prompt: " ".to_string(),
        };
        assert_eq!(none.apply("duck"), "duck");
    }

    #[test]
    fn test_variation_is_reproducible() {
        let variations = variations();
        for index in 0..10 {
            let first = PromptTemplate::choose_variation(&variations, 42, index);
            let second = PromptTemplate::choose_variation(&variations, 42, index);
            assert_eq!(first, second);
            assert!(variations.iter().any(|v| Some(v.as_str()) == first));
        }
    }

    #[test]
    fn test_no_variations() {
        assert_eq!(PromptTemplate::choose_variation(&[], 42, 0), None);
        assert_eq!(PromptTemplate::vary("duck", None), "duck");
        assert_eq!(PromptTemplate::vary("duck", Some("waving")), "duck, waving");
    }
}
