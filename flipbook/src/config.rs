//! Crate configuration.
//!
//! Every section deserializes with per-field defaults, so a JSON file only
//! needs the values it changes. `FLIPBOOK_*` environment variables override
//! the file. Nothing here is global; the loaded value is passed to
//! constructors.

use crate::batch::BatchConfig;
use crate::cache::CacheConfig;
use crate::compiler::CompilerConfig;
use crate::pipeline::RetryConfig;
use crate::stages::DEFAULT_MAX_TEXT_UNITS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The file is not valid JSON for [`FlipbookConfig`].
    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },

    /// A value is out of range or malformed.
    #[error("Invalid config value for '{key}': {reason}")]
    InvalidValue {
        /// Dotted key or environment variable.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Stage adapter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagesConfig {
    /// Image capability time budget.
    pub image_timeout_ms: u64,
    /// Text capability time budget.
    pub text_timeout_ms: u64,
    /// Largest `max_output_units` the text stage accepts.
    pub max_text_units: u32,
    /// Terms rejected by the keyword safety filter. Empty disables it.
    pub blocked_terms: Vec<String>,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            image_timeout_ms: 120_000,
            text_timeout_ms: 120_000,
            max_text_units: DEFAULT_MAX_TEXT_UNITS,
            blocked_terms: Vec::new(),
        }
    }
}

impl StagesConfig {
    /// Image time budget as a duration.
    #[must_use]
    pub const fn image_timeout(&self) -> Duration {
        Duration::from_millis(self.image_timeout_ms)
    }

    /// Text time budget as a duration.
    #[must_use]
    pub const fn text_timeout(&self) -> Duration {
        Duration::from_millis(self.text_timeout_ms)
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlipbookConfig {
    /// Artifact cache limits.
    pub cache: CacheConfig,
    /// Retry policy for transient stage failures.
    pub retry: RetryConfig,
    /// Stage adapter settings.
    pub stages: StagesConfig,
    /// Batch runner settings.
    pub batch: BatchConfig,
    /// Document rendering settings.
    pub compiler: CompilerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl FlipbookConfig {
    /// Reads a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the file (or defaults), applies environment overrides, and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        tracing::debug!(
            cache_max_entries = config.cache.max_entries,
            max_retries = config.retry.max_retries,
            parallelism = config.batch.parallelism,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Applies `FLIPBOOK_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_var(&lookup, "FLIPBOOK_CACHE_MAX_ENTRIES")? {
            self.cache.max_entries = value;
        }
        if let Some(value) = parse_var(&lookup, "FLIPBOOK_CACHE_MAX_BYTES")? {
            self.cache.max_bytes = Some(value);
        }
        if let Some(value) = parse_var(&lookup, "FLIPBOOK_MAX_RETRIES")? {
            self.retry.max_retries = value;
        }
        if let Some(value) = parse_var(&lookup, "FLIPBOOK_RETRY_BASE_DELAY_MS")? {
            self.retry.base_delay_ms = value;
        }
        if let Some(value) = parse_var(&lookup, "FLIPBOOK_BATCH_PARALLELISM")? {
            self.batch.parallelism = value;
        }
        if let Some(value) = lookup("FLIPBOOK_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = parse_var(&lookup, "FLIPBOOK_LOG_JSON")? {
            self.logging.json = value;
        }
        Ok(())
    }

    /// Rejects values no component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigError::invalid("cache.max_entries", "must be greater than 0"));
        }
        if self.cache.max_bytes == Some(0) {
            return Err(ConfigError::invalid("cache.max_bytes", "must be greater than 0"));
        }
        if self.batch.parallelism == 0 {
            return Err(ConfigError::invalid("batch.parallelism", "must be greater than 0"));
        }
        if self.batch.variations.iter().any(|v| v.trim().is_empty()) {
            return Err(ConfigError::invalid("batch.variations", "must not contain empty entries"));
        }
        if self.stages.image_timeout_ms == 0 || self.stages.text_timeout_ms == 0 {
            return Err(ConfigError::invalid("stages.*_timeout_ms", "must be greater than 0"));
        }
        if self.stages.max_text_units == 0 {
            return Err(ConfigError::invalid("stages.max_text_units", "must be greater than 0"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigError::invalid(
                "retry.max_delay_ms",
                "must not be smaller than retry.base_delay_ms",
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(key, format!("'{raw}': {e}")))
        })
        .transpose()
}
