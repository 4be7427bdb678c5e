//! Test doubles for the scheduler's collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

use crate::executor::{
    ExecutorError, ExecutorErrorKind, HealthCheckResult, HealthChecker, PipelineExecutor, PipelineRun,
    RecordSink, RecordSource,
};
use crate::schedule::{HealthCheckDescriptor, HealthCheckType};
use crate::transform::Record;

/// An executor that replays scripted outcomes per pipeline.
///
/// Once a pipeline's script runs out every call succeeds with a default run.
/// Every call is recorded with the runtime instant it started at.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Result<PipelineRun, ExecutorError>>>>,
    calls: Mutex<Vec<(String, Instant)>>,
    latency: Mutex<HashMap<String, Duration>>,
}

impl ScriptedExecutor {
    /// Creates an executor that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues outcomes for a pipeline.
    #[must_use]
    pub fn with_outcomes(
        self,
        pipeline_id: impl Into<String>,
        outcomes: impl IntoIterator<Item = Result<PipelineRun, ExecutorError>>,
    ) -> Self {
        self.scripts
            .lock()
            .entry(pipeline_id.into())
            .or_default()
            .extend(outcomes);
        self
    }

    /// Makes every call for a pipeline take `latency` of runtime time.
    #[must_use]
    pub fn with_latency(self, pipeline_id: impl Into<String>, latency: Duration) -> Self {
        self.latency.lock().insert(pipeline_id.into(), latency);
        self
    }

    /// Number of calls for a pipeline.
    #[must_use]
    pub fn calls(&self, pipeline_id: &str) -> usize {
        self.calls.lock().iter().filter(|(id, _)| id == pipeline_id).count()
    }

    /// Pipeline ids in call order.
    #[must_use]
    pub fn call_order(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    /// Start instants of the calls for a pipeline.
    #[must_use]
    pub fn call_instants(&self, pipeline_id: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(id, _)| id == pipeline_id)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl PipelineExecutor for ScriptedExecutor {
    async fn execute(&self, pipeline_id: &str) -> Result<PipelineRun, ExecutorError> {
        self.calls.lock().push((pipeline_id.to_string(), Instant::now()));

        let latency = self.latency.lock().get(pipeline_id).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let next = self
            .scripts
            .lock()
            .get_mut(pipeline_id)
            .and_then(VecDeque::pop_front);
        next.unwrap_or_else(|| Ok(PipelineRun::new(100, 1.0, 10)))
    }
}

/// An executor that always fails with the same error kind.
#[derive(Debug)]
pub struct FailingExecutor {
    kind: ExecutorErrorKind,
    calls: Mutex<usize>,
}

impl FailingExecutor {
    /// Creates an executor failing with `kind`.
    #[must_use]
    pub fn new(kind: ExecutorErrorKind) -> Self {
        Self {
            kind,
            calls: Mutex::new(0),
        }
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl PipelineExecutor for FailingExecutor {
    async fn execute(&self, pipeline_id: &str) -> Result<PipelineRun, ExecutorError> {
        *self.calls.lock() += 1;
        Err(ExecutorError::new(self.kind, format!("{pipeline_id} failed")))
    }
}

/// A health checker that fails the configured check types and records calls.
#[derive(Debug, Default)]
pub struct RecordingHealthChecker {
    failing: HashSet<HealthCheckType>,
    delay: Option<Duration>,
    metrics: HashMap<String, f64>,
    calls: Mutex<Vec<(String, HealthCheckType)>>,
}

impl RecordingHealthChecker {
    /// Creates a checker that passes everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails checks of this type.
    #[must_use]
    pub fn failing(mut self, check_type: HealthCheckType) -> Self {
        self.failing.insert(check_type);
        self
    }

    /// Makes every check take `delay` of runtime time.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reports a metric on every result.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Recorded (pipeline id, check type) calls.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, HealthCheckType)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HealthChecker for RecordingHealthChecker {
    async fn check(&self, pipeline_id: &str, descriptor: &HealthCheckDescriptor) -> HealthCheckResult {
        self.calls
            .lock()
            .push((pipeline_id.to_string(), descriptor.check_type));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.failing.contains(&descriptor.check_type) {
            HealthCheckResult::fail(descriptor.check_type, format!("{} check failed", descriptor.check_type))
        } else {
            HealthCheckResult::pass(descriptor.check_type)
        };
        result.with_metrics(self.metrics.clone())
    }
}

/// A record source serving fixed batches.
#[derive(Debug, Default)]
pub struct InMemoryRecordSource {
    batches: HashMap<String, Vec<Record>>,
}

impl InMemoryRecordSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `records` for a pipeline. Non-object values are ignored.
    #[must_use]
    pub fn with_batch(mut self, pipeline_id: impl Into<String>, records: Vec<Value>) -> Self {
        let records = records
            .into_iter()
            .filter_map(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.batches.insert(pipeline_id.into(), records);
        self
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn extract(&self, pipeline_id: &str) -> Result<Vec<Record>, ExecutorError> {
        self.batches.get(pipeline_id).cloned().ok_or_else(|| {
            ExecutorError::new(
                ExecutorErrorKind::SourceUnavailable,
                format!("No batch for pipeline '{pipeline_id}'"),
            )
        })
    }
}

/// A record sink that keeps loaded records in memory.
#[derive(Debug, Default)]
pub struct InMemoryRecordSink {
    loaded: Mutex<HashMap<String, Vec<Record>>>,
}

impl InMemoryRecordSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records loaded for a pipeline.
    #[must_use]
    pub fn loaded(&self, pipeline_id: &str) -> Vec<Record> {
        self.loaded.lock().get(pipeline_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl RecordSink for InMemoryRecordSink {
    async fn load(&self, pipeline_id: &str, records: Vec<Record>) -> Result<u64, ExecutorError> {
        let count = records.len() as u64;
        self.loaded
            .lock()
            .entry(pipeline_id.to_string())
            .or_default()
            .extend(records);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_executor_replays_then_succeeds() {
        let executor = ScriptedExecutor::new()
            .with_outcomes("a", [Err(ExecutorError::timeout("slow")), Ok(PipelineRun::new(5, 0.9, 1))]);

        assert!(executor.execute("a").await.is_err());
        assert_eq!(executor.execute("a").await.unwrap().records_processed, 5);
        assert_eq!(executor.execute("a").await.unwrap().records_processed, 100);
        assert_eq!(executor.calls("a"), 3);
        assert_eq!(executor.calls("b"), 0);
    }

    #[tokio::test]
    async fn test_failing_executor_counts() {
        let executor = FailingExecutor::new(ExecutorErrorKind::Connection);
        let err = executor.execute("a").await.unwrap_err();
        assert_eq!(err.kind, ExecutorErrorKind::Connection);
        assert_eq!(executor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_recording_health_checker() {
        let checker = RecordingHealthChecker::new().failing(HealthCheckType::Resource);
        let pass = checker
            .check("a", &HealthCheckDescriptor::new(HealthCheckType::Connectivity))
            .await;
        let fail = checker
            .check("a", &HealthCheckDescriptor::new(HealthCheckType::Resource))
            .await;

        assert!(pass.passed);
        assert!(!fail.passed);
        assert_eq!(checker.calls().len(), 2);
    }
}
