//! Execution records tracked for every triggered pipeline run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{ExecutionStatus, LogLevel, TriggerCause};
use crate::executor::{ExecutorError, HealthCheckResult};

/// A timestamped log line attached to an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// Entry severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
}

/// Outcome reported by the executor for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The executor succeeded.
    Success,
    /// The executor failed.
    Failed,
}

/// Result payload stored on a finished execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Success or failure.
    pub status: RunOutcome,
    /// Records the executor processed.
    pub records_processed: u64,
    /// Data quality score in `0.0..=1.0`.
    pub data_quality_score: f64,
    /// Wall-clock duration measured by the scheduler.
    pub duration_ms: u64,
    /// Structured failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutorError>,
}

/// Resource usage observed around a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// CPU utilisation percentage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    /// Resident memory in megabytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
}

impl ResourceUsage {
    /// Builds a snapshot from health-check metrics, if any resource figures are present.
    #[must_use]
    pub fn from_metrics(metrics: &HashMap<String, f64>) -> Option<Self> {
        let usage = Self {
            cpu_percent: metrics.get("cpu_percent").copied(),
            memory_mb: metrics.get("memory_mb").copied(),
        };
        if usage.cpu_percent.is_none() && usage.memory_mb.is_none() {
            None
        } else {
            Some(usage)
        }
    }
}

/// Throughput figures derived from a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Records processed per second of wall-clock time.
    pub records_per_second: f64,
}

impl PerformanceMetrics {
    /// Derives throughput from elapsed time and records processed.
    ///
    /// Elapsed time is floored at one millisecond.
    #[must_use]
    pub fn derive(duration_ms: u64, records_processed: u64) -> Self {
        let seconds = duration_ms.max(1) as f64 / 1000.0;
        Self {
            duration_ms,
            records_per_second: records_processed as f64 / seconds,
        }
    }
}

/// Metadata gathered over an execution's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    /// What caused the run.
    pub triggered_by: TriggerCause,
    /// Resource snapshot, if a resource health check reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_usage: Option<ResourceUsage>,
    /// Named quality scores.
    #[serde(default)]
    pub quality_scores: HashMap<String, f64>,
    /// Throughput, set once the executor returns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceMetrics>,
    /// Health check results for this run.
    #[serde(default)]
    pub health_checks: Vec<HealthCheckResult>,
    /// Why the run was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// The execution that held the in-flight token when this one was turned away.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    /// Delay before the retry armed from this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
}

impl ExecutionMetadata {
    /// Creates empty metadata for the given trigger.
    #[must_use]
    pub fn new(triggered_by: TriggerCause) -> Self {
        Self {
            triggered_by,
            resource_usage: None,
            quality_scores: HashMap::new(),
            performance: None,
            health_checks: Vec::new(),
            skip_reason: None,
            superseded_by: None,
            retry_delay_ms: None,
        }
    }
}

/// One triggered run of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledExecution {
    /// Unique id: `{pipeline_id}-{unix_millis}-{seq}`.
    pub id: String,
    /// The pipeline this run belongs to.
    pub pipeline_id: String,
    /// When the run was triggered.
    pub scheduled_time: DateTime<Utc>,
    /// When the executor was invoked.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a finished status.
    pub ended_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: ExecutionStatus,
    /// Executor result, once available.
    pub result: Option<ExecutionResult>,
    /// 1-based attempt number.
    pub retry_attempt: u32,
    /// Ordered log entries.
    pub logs: Vec<ExecutionLogEntry>,
    /// Lifecycle metadata.
    pub metadata: ExecutionMetadata,
}

impl ScheduledExecution {
    /// Creates a new execution in `Scheduled` status.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        pipeline_id: impl Into<String>,
        scheduled_time: DateTime<Utc>,
        triggered_by: TriggerCause,
        retry_attempt: u32,
    ) -> Self {
        Self {
            id: id.into(),
            pipeline_id: pipeline_id.into(),
            scheduled_time,
            started_at: None,
            ended_at: None,
            status: ExecutionStatus::Scheduled,
            result: None,
            retry_attempt,
            logs: Vec::new(),
            metadata: ExecutionMetadata::new(triggered_by),
        }
    }

    /// Appends a log entry.
    pub fn log(&mut self, timestamp: DateTime<Utc>, level: LogLevel, message: impl Into<String>) {
        self.logs.push(ExecutionLogEntry {
            timestamp,
            level,
            message: message.into(),
        });
    }

    /// Returns the trigger cause.
    #[must_use]
    pub fn triggered_by(&self) -> TriggerCause {
        self.metadata.triggered_by
    }

    /// Returns true if any log entry at `level` contains `needle`.
    #[must_use]
    pub fn has_log(&self, level: LogLevel, needle: &str) -> bool {
        self.logs
            .iter()
            .any(|entry| entry.level == level && entry.message.contains(needle))
    }
}
