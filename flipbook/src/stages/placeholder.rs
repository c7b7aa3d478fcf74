//! Deterministic stand-in capabilities.
//!
//! These mirror the mock generators of the flipbook demo: the image is a
//! labelled SVG card named after the first prompt tokens, and the story is a
//! fixed opening whose length scales with `max_output_units`. Output depends
//! only on the inputs, so runs are reproducible.

use super::{CapabilityError, GenerativeCapability, RawOutput};
use crate::compiler::escape_html;
use crate::core::{hash_hex, NumericParams};
use async_trait::async_trait;

const CARD_SIZE: u32 = 512;

const STORY_WORDS: [&str; 9] = [
    "Once", "upon", "a", "time", "a", "cheerful", "duck", "waddled", "happily",
];

/// Image capability that renders an SVG card.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderImageCapability;

impl PlaceholderImageCapability {
    /// Creates the capability.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// The card label: `MockImage_` plus the first three lowercase tokens.
    #[must_use]
    pub fn label(prompt: &str) -> String {
        let tokens: Vec<String> = prompt
            .split_whitespace()
            .take(3)
            .map(str::to_lowercase)
            .collect();
        format!("MockImage_{}", tokens.join("_"))
    }

    fn render(prompt: &str, params: &NumericParams) -> String {
        let digest = hash_hex(
            format!(
                "{prompt}|{:?}|{}|{}",
                params.seed, params.guidance_scale, params.adaptation_weight
            )
            .as_bytes(),
        );
        let fill = &digest[..6];
        let label = escape_html(&Self::label(prompt));
        format!(
            concat!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}">"#,
                r##"<rect width="{size}" height="{size}" fill="#{fill}"/>"##,
                r#"<text x="50%" y="50%" text-anchor="middle" font-family="sans-serif" font-size="24">{label}</text>"#,
                "</svg>"
            ),
            size = CARD_SIZE,
            fill = fill,
            label = label,
        )
    }
}

#[async_trait]
impl GenerativeCapability for PlaceholderImageCapability {
    fn name(&self) -> &str {
        "placeholder-image"
    }

    async fn invoke(
        &self,
        prompt: &str,
        params: &NumericParams,
    ) -> Result<RawOutput, CapabilityError> {
        tracing::debug!(
            guidance_scale = params.guidance_scale,
            adaptation_weight = params.adaptation_weight,
            "Rendering placeholder image"
        );
        Ok(RawOutput::Image {
            media_type: "image/svg+xml".to_string(),
            bytes: Self::render(prompt, params).into_bytes(),
            width: Some(CARD_SIZE),
            height: Some(CARD_SIZE),
        })
    }
}

/// Text capability that tells the same short story every time.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderStoryCapability;

impl PlaceholderStoryCapability {
    /// Creates the capability.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// The story for a given length budget.
    #[must_use]
    pub fn story(max_output_units: u32) -> String {
        let count = (max_output_units as usize / 5).min(STORY_WORDS.len());
        format!("{}... (mock story)", STORY_WORDS[..count].join(" "))
    }
}

#[async_trait]
impl GenerativeCapability for PlaceholderStoryCapability {
    fn name(&self) -> &str {
        "placeholder-story"
    }

    async fn invoke(
        &self,
        _prompt: &str,
        params: &NumericParams,
    ) -> Result<RawOutput, CapabilityError> {
        Ok(RawOutput::Text(Self::story(params.max_output_units)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::duck_params;

    #[test]
    fn test_image_label() {
        assert_eq!(
            PlaceholderImageCapability::label("A cheerful duck on a farm"),
            "MockImage_a_cheerful_duck"
        );
    }

    #[test]
    fn test_story_scales_with_budget() {
        assert_eq!(
            PlaceholderStoryCapability::story(150),
            "Once upon a time a cheerful duck waddled happily... (mock story)"
        );
        assert_eq!(
            PlaceholderStoryCapability::story(20),
            "Once upon a time... (mock story)"
        );
    }

    #[tokio::test]
    async fn test_image_is_deterministic() {
        let capability = PlaceholderImageCapability::new();
        let params = duck_params();

        let a = capability.invoke(params.prompt_text(), &params.numeric()).await.unwrap();
        let b = capability.invoke(params.prompt_text(), &params.numeric()).await.unwrap();
        assert_eq!(a, b);

        let reseeded = params.with_seed(Some(7));
        let c = capability
            .invoke(reseeded.prompt_text(), &reseeded.numeric())
            .await
            .unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_image_label_is_escaped() {
        let capability = PlaceholderImageCapability::new();
        let params = duck_params();

        let RawOutput::Image { bytes, .. } = capability
            .invoke("<b> & co", &params.numeric())
            .await
            .unwrap()
        else {
            panic!("expected image");
        };
        let svg = String::from_utf8(bytes).unwrap();
        assert!(svg.contains("MockImage_&lt;b&gt;_&amp;_co"));
    }
}
