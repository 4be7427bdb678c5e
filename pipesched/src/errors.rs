//! Error types for the pipeline scheduler.
//!
//! Executor failures are not represented here: they are data carried on
//! execution records (see [`crate::executor::ExecutorError`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::core::ExecutionStatus;

/// The main error type for scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A schedule failed validation at load time.
    #[error("{0}")]
    Validation(#[from] ScheduleValidationError),

    /// The dependency graph contains a cycle.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// A cadence expression could not be interpreted.
    #[error("{0}")]
    Cadence(#[from] CadenceError),

    /// No schedule is registered under the given id.
    #[error("Unknown pipeline: {0}")]
    UnknownPipeline(String),

    /// No execution is tracked under the given id.
    #[error("Unknown execution: {0}")]
    UnknownExecution(String),

    /// An execution tried to move backwards through its lifecycle.
    #[error("Invalid status transition for execution '{execution_id}': {from} -> {to}")]
    InvalidTransition {
        /// The execution id.
        execution_id: String,
        /// Current status.
        from: ExecutionStatus,
        /// Requested status.
        to: ExecutionStatus,
    },

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

/// Metadata attached to validation errors for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ErrorInfo {
    /// Error code (e.g., "SCHEDULE-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a schedule definition is rejected.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ScheduleValidationError {
    /// The error message.
    pub message: String,
    /// The pipelines involved in the error.
    pub pipelines: Vec<String>,
    /// Optional diagnostic info.
    pub error_info: Option<ErrorInfo>,
}

impl ScheduleValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            pipelines: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the pipelines involved.
    #[must_use]
    pub fn with_pipelines(mut self, pipelines: Vec<String>) -> Self {
        self.pipelines = pipelines;
        self
    }

    /// Sets the diagnostic info.
    #[must_use]
    pub fn with_error_info(mut self, info: ErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }
}

/// Error raised when the pipeline dependency graph contains a cycle.
#[derive(Debug, Clone, Error)]
#[error("Dependency cycle detected: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The pipelines forming the cycle, first id repeated at the end.
    pub cycle_path: Vec<String>,
    /// Diagnostic info.
    pub error_info: ErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ErrorInfo::new(
            "SCHEDULE-CYCLE",
            format!("Pipelines depend on each other: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

/// Error raised when a cadence expression is not understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CadenceError {
    /// The expression is not one of the supported forms.
    #[error("Unsupported cadence expression: '{0}'")]
    Unsupported(String),

    /// A numeric field is out of range.
    #[error("Cadence field out of range in '{expression}': {reason}")]
    OutOfRange {
        /// The offending expression.
        expression: String,
        /// What was out of range.
        reason: String,
    },

    /// No fire time could be found (e.g. every candidate fell into a DST gap).
    #[error("No upcoming fire time for cadence '{0}'")]
    NoUpcomingTime(String),
}

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// The file path.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The contents were not valid JSON for the expected shape.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value parsed but is not acceptable.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },
}
