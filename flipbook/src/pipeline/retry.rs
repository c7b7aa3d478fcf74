//! Retry utilities for transient stage failures.
//!
//! Only errors that report themselves as retryable are retried; everything
//! else is returned after the first attempt.

use crate::errors::StageError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * (retry + 1)
    #[default]
    Linear,
    /// delay = base * 2^retry
    Exponential,
    /// delay = base (constant)
    Constant,
}

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
            backoff_strategy: BackoffStrategy::Linear,
            jitter_strategy: JitterStrategy::None,
        }
    }
}

impl RetryConfig {
    /// Creates the default config: two retries, linear 250ms backoff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Retries without waiting between attempts.
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Disables retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self::immediate(0)
    }

    /// Sets the retry bound.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub const fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub const fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub const fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Total attempts allowed, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;

        let delay = match self.backoff_strategy {
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retry) + 1),
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(retry)),
            BackoffStrategy::Constant => base,
        }
        .min(max);

        let jittered = match self.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    /// Returns true for transient failures.
    fn is_retryable(&self) -> bool;
}

impl Retryable for StageError {
    fn is_retryable(&self) -> bool {
        StageError::is_retryable(self)
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more retries, give up.
    GiveUp,
    /// Don't retry, the error is not retryable.
    NotRetryable,
}

/// Decides what to do after attempt number `attempt` (1-indexed) failed.
#[must_use]
pub fn should_retry<E: Retryable>(config: &RetryConfig, attempt: u32, error: &E) -> RetryDecision {
    if !error.is_retryable() {
        RetryDecision::NotRetryable
    } else if attempt >= config.max_attempts() {
        RetryDecision::GiveUp
    } else {
        RetryDecision::Retry(config.delay_for(attempt - 1))
    }
}

/// Final result of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T, E> {
    /// Result of the last attempt.
    pub result: Result<T, E>,
    /// Attempts made, including the first.
    pub attempts: u32,
}

/// Executes an operation, retrying transient failures.
///
/// The operation receives the 1-indexed attempt number.
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 1;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(error) => error,
        };

        match should_retry(config, attempt, &error) {
            RetryDecision::Retry(delay) => {
                tracing::warn!(
                    operation = label,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            RetryDecision::GiveUp | RetryDecision::NotRetryable => {
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(config.jitter_strategy, JitterStrategy::None);
    }

    #[test]
    fn test_retry_config_from_partial_json() {
        let config: RetryConfig = serde_json::from_str(r#"{"max_retries":5}"#).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay_ms, RetryConfig::default().base_delay_ms);
    }

    #[test]
    fn test_linear_delay() {
        let config = RetryConfig::new().with_base_delay_ms(100);
        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(2), Duration::from_millis(300));
    }

    #[test]
    fn test_exponential_delay_capped() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_max_delay_ms(500)
            .with_backoff(BackoffStrategy::Exponential);
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(10), Duration::from_millis(500));
    }

    #[test]
    fn test_full_jitter_within_bounds() {
        let config = RetryConfig::new()
            .with_base_delay_ms(100)
            .with_jitter(JitterStrategy::Full);
        for _ in 0..50 {
            assert!(config.delay_for(0) <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_should_retry_decisions() {
        let config = RetryConfig::immediate(2);
        let transient = StageError::unavailable(StageKind::Image, "loading");
        let permanent = StageError::invalid_output(StageKind::Image, "empty");

        assert_eq!(
            should_retry(&config, 1, &transient),
            RetryDecision::Retry(Duration::ZERO)
        );
        assert_eq!(should_retry(&config, 3, &transient), RetryDecision::GiveUp);
        assert_eq!(
            should_retry(&config, 1, &permanent),
            RetryDecision::NotRetryable
        );
    }

    #[tokio::test]
    async fn test_persistent_transient_failure_uses_bound_plus_one_attempts() {
        let config = RetryConfig::immediate(2);
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<(), StageError> = with_retry(&config, "image", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(StageError::GenerationTimeout {
                    stage: StageKind::Image,
                    timeout_ms: 10,
                })
            }
        })
        .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(outcome.result.is_err());
    }

    #[tokio::test]
    async fn test_non_retryable_failure_is_not_retried() {
        let config = RetryConfig::immediate(2);

        let outcome: RetryOutcome<(), StageError> = with_retry(&config, "text", |_| async {
            Err(StageError::rejected(StageKind::Text, "blocked"))
        })
        .await;

        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let config = RetryConfig::immediate(2);

        let outcome = with_retry(&config, "image", |attempt| async move {
            if attempt < 2 {
                Err(StageError::unavailable(StageKind::Image, "warming up"))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(outcome.result, Ok(2));
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_attempts() {
        let config = RetryConfig::new().with_base_delay_ms(100);
        let start = tokio::time::Instant::now();

        let _: RetryOutcome<(), StageError> = with_retry(&config, "image", |_| async {
            Err(StageError::unavailable(StageKind::Image, "down"))
        })
        .await;

        // Linear: 100ms + 200ms.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
    }
}
