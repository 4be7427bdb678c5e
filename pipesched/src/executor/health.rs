//! Health check contract and built-in checkers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::schedule::{HealthCheckDescriptor, HealthCheckType};

/// Result of running one health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Which check ran.
    #[serde(rename = "type")]
    pub check_type: HealthCheckType,
    /// Whether the check passed.
    pub passed: bool,
    /// Metrics observed by the check.
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    /// Detail for failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthCheckResult {
    /// A passing result.
    #[must_use]
    pub fn pass(check_type: HealthCheckType) -> Self {
        Self {
            check_type,
            passed: true,
            metrics: HashMap::new(),
            message: None,
        }
    }

    /// A failing result.
    #[must_use]
    pub fn fail(check_type: HealthCheckType, message: impl Into<String>) -> Self {
        Self {
            check_type,
            passed: false,
            metrics: HashMap::new(),
            message: Some(message.into()),
        }
    }

    /// Attaches metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: HashMap<String, f64>) -> Self {
        self.metrics = metrics;
        self
    }
}

/// Runs health checks described by schedules.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Runs one check for a pipeline.
    async fn check(&self, pipeline_id: &str, descriptor: &HealthCheckDescriptor) -> HealthCheckResult;
}

/// A checker that passes every check.
///
/// Used as the default when no checker is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHealthChecker;

#[async_trait]
impl HealthChecker for NoOpHealthChecker {
    async fn check(&self, _pipeline_id: &str, descriptor: &HealthCheckDescriptor) -> HealthCheckResult {
        HealthCheckResult::pass(descriptor.check_type)
    }
}

/// Samples current metrics for a check type.
#[async_trait]
pub trait MetricsProbe: Send + Sync {
    /// Returns the metrics relevant to `check_type`.
    ///
    /// # Errors
    ///
    /// Returns a message if the metrics could not be sampled.
    async fn sample(
        &self,
        pipeline_id: &str,
        check_type: HealthCheckType,
    ) -> Result<HashMap<String, f64>, String>;
}

/// Evaluates descriptor thresholds against sampled metrics.
///
/// A threshold named `max_<metric>` requires `<metric> <= value`; `min_<metric>`
/// requires `<metric> >= value`. Thresholds with neither prefix are ignored.
/// A missing metric fails the check.
#[derive(Debug, Clone)]
pub struct MetricsHealthChecker<P> {
    probe: P,
}

impl<P: MetricsProbe> MetricsHealthChecker<P> {
    /// Creates a checker backed by `probe`.
    #[must_use]
    pub fn new(probe: P) -> Self {
        Self { probe }
    }
}

fn evaluate(descriptor: &HealthCheckDescriptor, metrics: &HashMap<String, f64>) -> Vec<String> {
    let mut names: Vec<&String> = descriptor.thresholds.keys().collect();
    names.sort();

    let mut violations = Vec::new();
    for name in names {
        let limit = descriptor.thresholds[name];
        let (metric, is_max) = if let Some(metric) = name.strip_prefix("max_") {
            (metric, true)
        } else if let Some(metric) = name.strip_prefix("min_") {
            (metric, false)
        } else {
            continue;
        };

        match metrics.get(metric) {
            None => violations.push(format!("metric '{metric}' not reported")),
            Some(value) if is_max && *value > limit => {
                violations.push(format!("{metric} {value} exceeds {limit}"));
            }
            Some(value) if !is_max && *value < limit => {
                violations.push(format!("{metric} {value} below {limit}"));
            }
            Some(_) => {}
        }
    }
    violations
}

#[async_trait]
impl<P: MetricsProbe> HealthChecker for MetricsHealthChecker<P> {
    async fn check(&self, pipeline_id: &str, descriptor: &HealthCheckDescriptor) -> HealthCheckResult {
        let metrics = match self.probe.sample(pipeline_id, descriptor.check_type).await {
            Ok(metrics) => metrics,
            Err(message) => return HealthCheckResult::fail(descriptor.check_type, message),
        };

        let violations = evaluate(descriptor, &metrics);
        let result = if violations.is_empty() {
            HealthCheckResult::pass(descriptor.check_type)
        } else {
            HealthCheckResult::fail(descriptor.check_type, violations.join("; "))
        };
        result.with_metrics(metrics)
    }
}
