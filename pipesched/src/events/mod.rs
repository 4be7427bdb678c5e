//! Lifecycle events emitted by the scheduler.
//!
//! Events are structured values handed to an injected [`EventSink`]; the
//! scheduler also logs every decision through `tracing`, so a sink is only
//! needed when a host wants to react to events programmatically.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of scheduler event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Timers were armed.
    #[serde(rename = "scheduler.started")]
    SchedulerStarted,
    /// Timers were cancelled.
    #[serde(rename = "scheduler.stopped")]
    SchedulerStopped,
    /// The executor was invoked.
    #[serde(rename = "execution.started")]
    ExecutionStarted,
    /// The executor succeeded.
    #[serde(rename = "execution.completed")]
    ExecutionCompleted,
    /// The executor failed.
    #[serde(rename = "execution.failed")]
    ExecutionFailed,
    /// A gate skipped the run.
    #[serde(rename = "execution.skipped")]
    ExecutionSkipped,
    /// A retry timer was armed.
    #[serde(rename = "execution.retry_scheduled")]
    RetryScheduled,
    /// Retries ran out; the failure needs a human.
    #[serde(rename = "execution.retries_exhausted")]
    RetriesExhausted,
    /// The monitor relabeled a run stuck.
    #[serde(rename = "execution.stuck")]
    ExecutionStuck,
    /// A monitor sweep finished.
    #[serde(rename = "monitor.sweep")]
    MonitorSweep,
}

impl EventKind {
    /// Dotted event name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SchedulerStarted => "scheduler.started",
            Self::SchedulerStopped => "scheduler.stopped",
            Self::ExecutionStarted => "execution.started",
            Self::ExecutionCompleted => "execution.completed",
            Self::ExecutionFailed => "execution.failed",
            Self::ExecutionSkipped => "execution.skipped",
            Self::RetryScheduled => "execution.retry_scheduled",
            Self::RetriesExhausted => "execution.retries_exhausted",
            Self::ExecutionStuck => "execution.stuck",
            Self::MonitorSweep => "monitor.sweep",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduler event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Pipeline concerned, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    /// Execution concerned, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    /// Extra payload.
    #[serde(default)]
    pub data: Value,
}

impl SchedulerEvent {
    /// Creates an event with no pipeline, execution or payload.
    #[must_use]
    pub fn new(kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            timestamp,
            pipeline_id: None,
            execution_id: None,
            data: Value::Null,
        }
    }

    /// Sets the pipeline id.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline_id: impl Into<String>) -> Self {
        self.pipeline_id = Some(pipeline_id.into());
        self
    }

    /// Sets the execution id.
    #[must_use]
    pub fn with_execution(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_dotted_kind() {
        let event = SchedulerEvent::new(EventKind::RetryScheduled, Utc::now())
            .with_pipeline("etl")
            .with_execution("etl-1-0")
            .with_data(json!({"delay_ms": 60000}));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "execution.retry_scheduled");
        assert_eq!(value["pipeline_id"], "etl");
        assert_eq!(value["data"]["delay_ms"], 60000);
    }

    #[test]
    fn test_kind_display_matches_serde() {
        for kind in [EventKind::MonitorSweep, EventKind::ExecutionStuck, EventKind::SchedulerStopped] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }
}
