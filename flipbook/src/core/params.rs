//! Validated generation parameters.

use crate::errors::InvalidParameterError;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Allowed classifier-free guidance scale.
pub const GUIDANCE_SCALE_RANGE: RangeInclusive<f64> = 1.0..=20.0;

/// Allowed adaptation (LoRA) weight.
pub const ADAPTATION_WEIGHT_RANGE: RangeInclusive<f64> = 0.0..=1.0;

/// Guidance scale used by the original flipbook demo.
pub const DEFAULT_GUIDANCE_SCALE: f64 = 7.0;

/// Adaptation weight used by the original flipbook demo.
pub const DEFAULT_ADAPTATION_WEIGHT: f64 = 0.9;

/// Story length used by the original flipbook demo.
pub const DEFAULT_MAX_OUTPUT_UNITS: u32 = 150;

/// Numeric knobs handed to a generative capability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericParams {
    /// Classifier-free guidance scale.
    pub guidance_scale: f64,
    /// Adaptation weight.
    pub adaptation_weight: f64,
    /// Maximum output length in units (words for text).
    pub max_output_units: u32,
    /// Random seed, if pinned.
    pub seed: Option<u64>,
}

/// Immutable, validated configuration for one stage invocation.
///
/// Construct through [`GenerationParameters::builder`]; every `with_*` method
/// returns a new validated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGenerationParameters")]
pub struct GenerationParameters {
    prompt_text: String,
    guidance_scale: f64,
    adaptation_weight: f64,
    max_output_units: u32,
    seed: Option<u64>,
}

impl GenerationParameters {
    /// Starts a builder with the demo defaults.
    #[must_use]
    pub fn builder(prompt_text: impl Into<String>) -> GenerationParametersBuilder {
        GenerationParametersBuilder::new(prompt_text)
    }

    /// Creates parameters with the demo defaults.
    pub fn new(prompt_text: impl Into<String>) -> Result<Self, InvalidParameterError> {
        Self::builder(prompt_text).build()
    }

    /// The prompt text.
    #[must_use]
    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    /// The guidance scale.
    #[must_use]
    pub const fn guidance_scale(&self) -> f64 {
        self.guidance_scale
    }

    /// The adaptation weight.
    #[must_use]
    pub const fn adaptation_weight(&self) -> f64 {
        self.adaptation_weight
    }

    /// The maximum output length.
    #[must_use]
    pub const fn max_output_units(&self) -> u32 {
        self.max_output_units
    }

    /// The pinned seed, if any.
    #[must_use]
    pub const fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// The numeric knobs without the prompt.
    #[must_use]
    pub const fn numeric(&self) -> NumericParams {
        NumericParams {
            guidance_scale: self.guidance_scale,
            adaptation_weight: self.adaptation_weight,
            max_output_units: self.max_output_units,
            seed: self.seed,
        }
    }

    /// Returns a copy with a different prompt.
    pub fn with_prompt(&self, prompt_text: impl Into<String>) -> Result<Self, InvalidParameterError> {
        self.to_builder().prompt_text(prompt_text).build()
    }

    /// Returns a copy with a different seed.
    #[must_use]
    pub fn with_seed(&self, seed: Option<u64>) -> Self {
        Self {
            seed,
            ..self.clone()
        }
    }

    /// Returns a builder pre-filled with these values.
    #[must_use]
    pub fn to_builder(&self) -> GenerationParametersBuilder {
        GenerationParametersBuilder {
            prompt_text: self.prompt_text.clone(),
            guidance_scale: self.guidance_scale,
            adaptation_weight: self.adaptation_weight,
            max_output_units: self.max_output_units,
            seed: self.seed,
        }
    }
}

/// Builder for [`GenerationParameters`].
#[derive(Debug, Clone)]
pub struct GenerationParametersBuilder {
    prompt_text: String,
    guidance_scale: f64,
    adaptation_weight: f64,
    max_output_units: u32,
    seed: Option<u64>,
}

impl GenerationParametersBuilder {
    /// Creates a builder with the demo defaults.
    #[must_use]
    pub fn new(prompt_text: impl Into<String>) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            adaptation_weight: DEFAULT_ADAPTATION_WEIGHT,
            max_output_units: DEFAULT_MAX_OUTPUT_UNITS,
            seed: None,
        }
    }

    /// Sets the prompt text.
    #[must_use]
    pub fn prompt_text(mut self, prompt_text: impl Into<String>) -> Self {
        self.prompt_text = prompt_text.into();
        self
    }

    /// Sets the guidance scale.
    #[must_use]
    pub const fn guidance_scale(mut self, value: f64) -> Self {
        self.guidance_scale = value;
        self
    }

    /// Sets the adaptation weight.
    #[must_use]
    pub const fn adaptation_weight(mut self, value: f64) -> Self {
        self.adaptation_weight = value;
        self
    }

    /// Sets the maximum output length.
    #[must_use]
    pub const fn max_output_units(mut self, value: u32) -> Self {
        self.max_output_units = value;
        self
    }

    /// Pins the seed.
    #[must_use]
    pub const fn seed(mut self, value: u64) -> Self {
        self.seed = Some(value);
        self
    }

    /// Validates and builds the parameters.
    pub fn build(self) -> Result<GenerationParameters, InvalidParameterError> {
        if self.prompt_text.trim().is_empty() {
            return Err(InvalidParameterError::new(
                "prompt_text",
                "must not be empty",
            ));
        }
        let guidance_scale =
            check_range("guidance_scale", self.guidance_scale, &GUIDANCE_SCALE_RANGE)?;
        let adaptation_weight = check_range(
            "adaptation_weight",
            self.adaptation_weight,
            &ADAPTATION_WEIGHT_RANGE,
        )?;
        if self.max_output_units == 0 {
            return Err(InvalidParameterError::new(
                "max_output_units",
                "must be greater than 0",
            ));
        }

        Ok(GenerationParameters {
            prompt_text: self.prompt_text,
            guidance_scale: self.guidance_scale,
            adaptation_weight: self.adaptation_weight,
            max_output_units: self.max_output_units,
            seed: self.seed,
        })
    }
}

/// Validates `value` and returns it with negative zero folded into zero, so
/// equal parameters always serialize identically.
fn check_range(
    field: &str,
    value: f64,
    range: &RangeInclusive<f64>,
) -> Result<f64, InvalidParameterError> {
    if !value.is_finite() {
        return Err(InvalidParameterError::new(field, "must be a finite number"));
    }
    if !range.contains(&value) {
        return Err(InvalidParameterError::new(
            field,
            format!(
                "must be within [{:?}, {:?}], got {value}",
                range.start(),
                range.end()
            ),
        ));
    }
    Ok(value + 0.0)
}

/// Unvalidated wire form; deserialization goes through the builder.
#[derive(Deserialize)]
struct RawGenerationParameters {
    prompt_text: String,
    #[serde(default = "default_guidance_scale")]
    guidance_scale: f64,
    #[serde(default = "default_adaptation_weight")]
    adaptation_weight: f64,
    #[serde(default = "default_max_output_units")]
    max_output_units: u32,
    #[serde(default)]
    seed: Option<u64>,
}

const fn default_guidance_scale() -> f64 {
    DEFAULT_GUIDANCE_SCALE
}

const fn default_adaptation_weight() -> f64 {
    DEFAULT_ADAPTATION_WEIGHT
}

const fn default_max_output_units() -> u32 {
    DEFAULT_MAX_OUTPUT_UNITS
}

impl TryFrom<RawGenerationParameters> for GenerationParameters {
    type Error = InvalidParameterError;

    fn try_from(raw: RawGenerationParameters) -> Result<Self, Self::Error> {
        let mut builder = GenerationParametersBuilder::new(raw.prompt_text)
            .guidance_scale(raw.guidance_scale)
            .adaptation_weight(raw.adaptation_weight)
            .max_output_units(raw.max_output_units);
        builder.seed = raw.seed;
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_demo() {
        let params = GenerationParameters::new("A cheerful duck on a farm").unwrap();

        assert_eq!(params.guidance_scale(), 7.0);
        assert_eq!(params.adaptation_weight(), 0.9);
        assert_eq!(params.max_output_units(), 150);
        assert_eq!(params.seed(), None);
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let err = GenerationParameters::new("   ").unwrap_err();
        assert_eq!(err.field, "prompt_text");
    }

    #[test]
    fn test_guidance_scale_bounds() {
        assert!(GenerationParameters::builder("p").guidance_scale(1.0).build().is_ok());
        assert!(GenerationParameters::builder("p").guidance_scale(20.0).build().is_ok());

        let err = GenerationParameters::builder("p")
            .guidance_scale(0.5)
            .build()
            .unwrap_err();
        assert_eq!(err.field, "guidance_scale");
        assert!(err.constraint.contains("[1.0, 20.0]"));
    }

    #[test]
    fn test_adaptation_weight_bounds() {
        let err = GenerationParameters::builder("p")
            .adaptation_weight(1.5)
            .build()
            .unwrap_err();
        assert_eq!(err.field, "adaptation_weight");
    }

    #[test]
    fn test_nan_rejected() {
        let err = GenerationParameters::builder("p")
            .guidance_scale(f64::NAN)
            .build()
            .unwrap_err();
        assert_eq!(err.field, "guidance_scale");
        assert_eq!(err.constraint, "must be a finite number");
    }

    #[test]
    fn test_zero_output_units_rejected() {
        let err = GenerationParameters::builder("p")
            .max_output_units(0)
            .build()
            .unwrap_err();
        assert_eq!(err.field, "max_output_units");
    }

    #[test]
    fn test_with_prompt_revalidates() {
        let params = GenerationParameters::builder("base").seed(7).build().unwrap();

        let changed = params.with_prompt("other").unwrap();
        assert_eq!(changed.prompt_text(), "other");
        assert_eq!(changed.seed(), Some(7));

        assert!(params.with_prompt("").is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: GenerationParameters =
            serde_json::from_str(r#"{"prompt_text":"duck","seed":42}"#).unwrap();
        assert_eq!(ok.seed(), Some(42));
        assert_eq!(ok.guidance_scale(), DEFAULT_GUIDANCE_SCALE);

        let bad = serde_json::from_str::<GenerationParameters>(
            r#"{"prompt_text":"duck","guidance_scale":50.0}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_equal_fields_are_equal() {
        let a = GenerationParameters::builder("duck").seed(1).build().unwrap();
        let b = GenerationParameters::builder("duck").seed(1).build().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_negative_zero_is_folded() {
        let params = GenerationParameters::builder("duck")
            .adaptation_weight(-0.0)
            .build()
            .unwrap();
        assert!(params.adaptation_weight().is_sign_positive());
        assert!(serde_json::to_string(&params)
            .unwrap()
            .contains(r#""adaptation_weight":0.0"#));
    }
}
