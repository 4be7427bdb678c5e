//! Runtime configuration for the scheduler and the workflow error handler.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;

/// Whether failed health checks block a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckMode {
    /// Failures are logged on the execution and the run proceeds.
    #[default]
    Advisory,
    /// Any failure skips the run.
    Enforced,
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between monitor sweeps.
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,

    /// Days an execution record is kept.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Minutes a run may stay `running` before it is declared stuck.
    #[serde(default = "default_stuck_threshold_minutes")]
    pub stuck_threshold_minutes: u32,

    /// Health check gating.
    #[serde(default)]
    pub health_check_mode: HealthCheckMode,
}

fn default_monitor_interval_secs() -> u64 {
    300
}

fn default_retention_days() -> u32 {
    7
}

fn default_stuck_threshold_minutes() -> u32 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            monitor_interval_secs: default_monitor_interval_secs(),
            retention_days: default_retention_days(),
            stuck_threshold_minutes: default_stuck_threshold_minutes(),
            health_check_mode: HealthCheckMode::default(),
        }
    }
}

impl SchedulerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the monitor interval.
    #[must_use]
    pub fn with_monitor_interval_secs(mut self, secs: u64) -> Self {
        self.monitor_interval_secs = secs;
        self
    }

    /// Sets the retention window.
    #[must_use]
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Sets the stuck threshold.
    #[must_use]
    pub fn with_stuck_threshold_minutes(mut self, minutes: u32) -> Self {
        self.stuck_threshold_minutes = minutes;
        self
    }

    /// Sets the health check mode.
    #[must_use]
    pub fn with_health_check_mode(mut self, mode: HealthCheckMode) -> Self {
        self.health_check_mode = mode;
        self
    }

    /// Interval between monitor sweeps.
    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    /// Retention window.
    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    /// Stuck threshold.
    #[must_use]
    pub fn stuck_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.stuck_threshold_minutes))
    }

    /// Checks that every interval is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = |field: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            reason: "must be greater than zero".to_string(),
        };
        if self.monitor_interval_secs == 0 {
            return Err(zero("monitor_interval_secs"));
        }
        if self.retention_days == 0 {
            return Err(zero("retention_days"));
        }
        if self.stuck_threshold_minutes == 0 {
            return Err(zero("stuck_threshold_minutes"));
        }
        Ok(())
    }

    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an I/O, parse or validation error.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&read_file(path.as_ref())?)
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open breaker waits before allowing a trial.
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_secs() -> u64 {
    60
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Reset timeout as a duration.
    #[must_use]
    pub fn reset_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.reset_timeout_secs).unwrap_or(i64::MAX))
    }
}

/// Workflow error handler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorHandlerConfig {
    /// Attempts after which a retry recommendation escalates instead.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for handler-recommended retries, in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Errors remembered per workflow.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Breaker settings.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_history_limit() -> usize {
    100
}

impl Default for ErrorHandlerConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            history_limit: default_history_limit(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ErrorHandlerConfig {
    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns a parse error, or [`ConfigError::InvalidValue`] for a zero
    /// failure threshold.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        if config.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "circuit_breaker.failure_threshold".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(config)
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
