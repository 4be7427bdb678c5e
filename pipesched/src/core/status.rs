//! Execution status, trigger cause and log level enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle status of a scheduled execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created, gates not yet evaluated.
    #[default]
    Scheduled,
    /// The executor has been invoked.
    Running,
    /// The executor reported success.
    Completed,
    /// The executor failed, or the run was declared stuck.
    Failed,
    /// Failed and a retry has been armed for this run.
    Retrying,
    /// A gate short-circuited the run before the executor was called.
    Skipped,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Retrying => write!(f, "retrying"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl ExecutionStatus {
    /// Returns true if no further transition is expected.
    ///
    /// `Failed` is not terminal: it may still move to `Retrying`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Retrying | Self::Skipped)
    }

    /// Returns true if the status represents a finished run of any outcome.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Scheduled | Self::Running)
    }

    /// Returns true if the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Running | Self::Skipped)
                | (
                    Self::Running,
                    Self::Completed | Self::Failed | Self::Retrying | Self::Skipped
                )
                | (Self::Failed, Self::Retrying)
        )
    }
}

/// What caused an execution to be triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCause {
    /// The cadence timer fired.
    Schedule,
    /// An operator requested the run.
    Manual,
    /// An upstream pipeline completed.
    Dependency,
    /// A retry timer fired after a failure.
    Retry,
}

impl fmt::Display for TriggerCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schedule => write!(f, "schedule"),
            Self::Manual => write!(f, "manual"),
            Self::Dependency => write!(f, "dependency"),
            Self::Retry => write!(f, "retry"),
        }
    }
}

/// Severity of an execution log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Informational.
    Info,
    /// Something unexpected that did not stop the run.
    Warn,
    /// The run failed or was escalated.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}
