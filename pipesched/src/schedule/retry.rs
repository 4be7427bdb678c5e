//! Retry policy with exponential backoff and optional jitter.
//!
//! Attempt numbers are 1-based: attempt 1 is the first run. The delay
//! armed after attempt `n` fails is
//! `min(initial_delay × multiplier^(n-1), max_delay)`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::errors::{ErrorInfo, ScheduleValidationError};
use crate::executor::ExecutorErrorKind;

/// Jitter applied on top of the computed backoff delay.
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

/// Retry configuration for one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failure, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Delay cap, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
    /// Executor error kinds that may be retried.
    #[serde(default = "default_retryable_errors")]
    pub retryable_errors: HashSet<ExecutorErrorKind>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    60_000
}

fn default_max_delay_ms() -> u64 {
    900_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_retryable_errors() -> HashSet<ExecutorErrorKind> {
    [
        ExecutorErrorKind::Connection,
        ExecutorErrorKind::Timeout,
        ExecutorErrorKind::RateLimited,
        ExecutorErrorKind::SourceUnavailable,
    ]
    .into_iter()
    .collect()
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: JitterStrategy::None,
            retryable_errors: default_retryable_errors(),
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// Attempts are exhausted; escalate instead.
    GiveUp,
    /// The error kind is not retryable.
    NotRetryable,
}

impl RetryPolicy {
    /// Creates a policy with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay_ms(mut self, delay: u64) -> Self {
        self.initial_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replaces the set of retryable error kinds.
    #[must_use]
    pub fn with_retryable_errors(mut self, kinds: impl IntoIterator<Item = ExecutorErrorKind>) -> Self {
        self.retryable_errors = kinds.into_iter().collect();
        self
    }

    /// Returns true if errors of `kind` may be retried.
    #[must_use]
    pub fn is_retryable(&self, kind: ExecutorErrorKind) -> bool {
        self.retryable_errors.contains(&kind)
    }

    /// Backoff delay armed after `attempt` fails, before jitter.
    #[must_use]
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Backoff delay armed after `attempt` fails, with jitter applied.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = u64::try_from(self.base_delay_for_attempt(attempt).as_millis()).unwrap_or(u64::MAX);

        let jittered = match self.jitter {
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

    /// Decides whether the run that just failed on `attempt` should be retried.
    #[must_use]
    pub fn decide(&self, attempt: u32, kind: ExecutorErrorKind) -> RetryDecision {
        if !self.is_retryable(kind) {
            return RetryDecision::NotRetryable;
        }
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(self.delay_for_attempt(attempt))
    }

    /// Validates the policy.
    ///
    /// # Errors
    ///
    /// Returns an error for zero attempts, a multiplier below 1, or an
    /// initial delay above the cap.
    pub fn validate(&self, pipeline_id: &str) -> Result<(), ScheduleValidationError> {
        let problem = if self.max_attempts == 0 {
            Some("max_attempts must be at least 1".to_string())
        } else if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            Some(format!(
                "backoff_multiplier must be a finite value >= 1, got {}",
                self.backoff_multiplier
            ))
        } else if self.initial_delay_ms > self.max_delay_ms {
            Some(format!(
                "initial_delay_ms ({}) exceeds max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            ))
        } else {
            None
        };

        match problem {
            Some(reason) => Err(ScheduleValidationError::new(format!(
                "Pipeline '{pipeline_id}' has an invalid retry policy: {reason}"
            ))
            .with_pipelines(vec![pipeline_id.to_string()])
            .with_error_info(ErrorInfo::new("SCHEDULE-RETRY", reason))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay_ms, 60_000);
        assert_eq!(policy.max_delay_ms, 900_000);
        assert_eq!(policy.jitter, JitterStrategy::None);
        assert!(policy.is_retryable(ExecutorErrorKind::Timeout));
        assert!(!policy.is_retryable(ExecutorErrorKind::Authentication));
    }

    #[test]
    fn test_exponential_delays_capped() {
        let policy = RetryPolicy::new()
            .with_initial_delay_ms(100)
            .with_backoff_multiplier(3.0)
            .with_max_delay_ms(1000);

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(300));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(900));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_full_jitter_stays_within_base_delay() {
        let policy = RetryPolicy::new()
            .with_initial_delay_ms(100)
            .with_jitter(JitterStrategy::Full);

        for _ in 0..20 {
            assert!(policy.delay_for_attempt(1) <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_equal_jitter_keeps_half() {
        let policy = RetryPolicy::new()
            .with_initial_delay_ms(100)
            .with_jitter(JitterStrategy::Equal);

        for _ in 0..20 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(100));
        }
    }

    #[test]
    fn test_decide() {
        let policy = RetryPolicy::new()
            .with_max_attempts(3)
            .with_initial_delay_ms(10)
            .with_max_delay_ms(100);

        assert_eq!(
            policy.decide(1, ExecutorErrorKind::Connection),
            RetryDecision::Retry(Duration::from_millis(10))
        );
        assert_eq!(
            policy.decide(2, ExecutorErrorKind::Connection),
            RetryDecision::Retry(Duration::from_millis(20))
        );
        assert_eq!(policy.decide(3, ExecutorErrorKind::Connection), RetryDecision::GiveUp);
        assert_eq!(
            policy.decide(1, ExecutorErrorKind::Validation),
            RetryDecision::NotRetryable
        );
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate("p").is_ok());
        assert!(RetryPolicy::new().with_max_attempts(0).validate("p").is_err());
        assert!(RetryPolicy::new().with_backoff_multiplier(0.5).validate("p").is_err());
        assert!(RetryPolicy::new()
            .with_backoff_multiplier(f64::NAN)
            .validate("p")
            .is_err());
        assert!(RetryPolicy::new()
            .with_initial_delay_ms(10)
            .with_max_delay_ms(5)
            .validate("p")
            .is_err());
    }

    #[test]
    fn test_deserialize_partial_policy_uses_defaults() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_attempts": 5, "retryable_errors": ["timeout"]}"#).unwrap();

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay_ms, 60_000);
        assert!(policy.is_retryable(ExecutorErrorKind::Timeout));
        assert!(!policy.is_retryable(ExecutorErrorKind::Connection));
    }
}
