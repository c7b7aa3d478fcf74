//! Batch requests and their planned runs.

use super::{BatchConfig, PromptEnhancement, PromptTemplate};
use crate::cache::CachePolicy;
use crate::compiler::Hotspot;
use crate::core::GenerationParameters;
use crate::errors::InvalidParameterError;
use crate::pipeline::RunRequest;
use crate::utils::generate_batch_id;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// N runs over one prompt template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Base prompts.
    pub template: PromptTemplate,
    /// Numeric settings shared by every run. A pinned seed becomes the base
    /// seed: run `i` uses `seed + i`.
    pub base_params: GenerationParameters,
    /// Number of runs.
    pub count: usize,
    /// Optional image prompt enhancement.
    #[serde(default)]
    pub enhancement: Option<PromptEnhancement>,
    /// Hotspots for every document.
    #[serde(default = "default_hotspots")]
    pub hotspots: Vec<Hotspot>,
    /// Cache policy for every run.
    #[serde(default)]
    pub cache_policy: CachePolicy,
}

fn default_hotspots() -> Vec<Hotspot> {
    vec![Hotspot::waddle_duck()]
}

impl BatchRequest {
    /// Creates a request, validating the template against `base_params`.
    pub fn new(
        template: PromptTemplate,
        base_params: GenerationParameters,
        count: usize,
    ) -> Result<Self, InvalidParameterError> {
        base_params.with_prompt(template.image.as_str())?;
        base_params.with_prompt(template.story.as_str())?;
        if count == 0 {
            return Err(InvalidParameterError::new("count", "must be greater than 0"));
        }
        Ok(Self {
            template,
            base_params,
            count,
            enhancement: None,
            hotspots: default_hotspots(),
            cache_policy: CachePolicy::UseCache,
        })
    }

    /// Enhances every image prompt.
    #[must_use]
    pub fn with_enhancement(mut self, enhancement: PromptEnhancement) -> Self {
        self.enhancement = Some(enhancement);
        self
    }

    /// Replaces the hotspots.
    #[must_use]
    pub fn with_hotspots(mut self, hotspots: Vec<Hotspot>) -> Self {
        self.hotspots = hotspots;
        self
    }

    /// Sets the cache policy.
    #[must_use]
    pub const fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    fn plan_index(
        &self,
        index: usize,
        variation: Option<&str>,
    ) -> Result<RunRequest, InvalidParameterError> {
        let mut image_prompt = PromptTemplate::vary(&self.template.image, variation);
        if let Some(enhancement) = &self.enhancement {
            image_prompt = enhancement.apply(&image_prompt);
        }
        let story_prompt = PromptTemplate::vary(&self.template.story, variation);

        let seed = self
            .base_params
            .seed()
            .map(|base| base.wrapping_add(index as u64));
        let params = self.base_params.with_seed(seed);

        Ok(RunRequest::new(image_prompt, story_prompt, &params)?
            .with_hotspots(self.hotspots.clone())
            .with_cache_policy(self.cache_policy))
    }
}

/// One indexed run of a batch.
#[derive(Debug, Clone)]
pub struct PlannedRun {
    /// Position in the batch (0-based).
    pub index: usize,
    /// The variation applied, if any.
    pub variation: Option<String>,
    /// The run request, or why it could not be built.
    pub request: Result<RunRequest, InvalidParameterError>,
}

/// A planned batch.
#[derive(Debug, Clone)]
pub struct BatchJob {
    id: Uuid,
    runs: Vec<PlannedRun>,
}

impl BatchJob {
    /// Derives one run request per index.
    #[must_use]
    pub fn plan(request: &BatchRequest, config: &BatchConfig) -> Self {
        let runs = (0..request.count)
            .map(|index| {
                let variation =
                    PromptTemplate::choose_variation(&config.variations, config.seed, index);
                PlannedRun {
                    index,
                    variation: variation.map(String::from),
                    request: request.plan_index(index, variation),
                }
            })
            .collect();
        Self {
            id: generate_batch_id(),
            runs,
        }
    }

    /// The batch id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// The planned runs in index order.
    #[must_use]
    pub fn runs(&self) -> &[PlannedRun] {
        &self.runs
    }

    /// Number of runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Returns true if the batch has no runs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub(crate) fn into_runs(self) -> Vec<PlannedRun> {
        self.runs
    }
}
