//! Health check descriptors attached to schedules.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// The kind of pre-run health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckType {
    /// Source/destination reachability.
    Connectivity,
    /// Freshness and quality of upstream data.
    DataQuality,
    /// Latency and throughput of the serving path.
    Performance,
    /// CPU and memory headroom.
    Resource,
}

impl fmt::Display for HealthCheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connectivity => write!(f, "connectivity"),
            Self::DataQuality => write!(f, "data_quality"),
            Self::Performance => write!(f, "performance"),
            Self::Resource => write!(f, "resource"),
        }
    }
}

/// Describes one health check to run before a pipeline executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckDescriptor {
    /// Which check to run.
    #[serde(rename = "type")]
    pub check_type: HealthCheckType,
    /// Named thresholds interpreted by the checker (e.g. `max_cpu_percent`).
    #[serde(default)]
    pub thresholds: HashMap<String, f64>,
    /// Time budget for the check, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl HealthCheckDescriptor {
    /// Creates a descriptor with no thresholds and the default timeout.
    #[must_use]
    pub fn new(check_type: HealthCheckType) -> Self {
        Self {
            check_type,
            thresholds: HashMap::new(),
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Adds a threshold.
    #[must_use]
    pub fn with_threshold(mut self, name: impl Into<String>, value: f64) -> Self {
        self.thresholds.insert(name.into(), value);
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Returns the timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
