//! Assertions over execution records.

use crate::core::{ExecutionStatus, ScheduledExecution, TriggerCause};

/// Asserts that an execution has the expected status.
pub fn assert_execution_status(execution: &ScheduledExecution, expected: ExecutionStatus) {
    assert_eq!(
        execution.status, expected,
        "Expected execution '{}' to be {expected}, got {}. Logs: {:?}",
        execution.id, execution.status, execution.logs
    );
}

/// Asserts that an execution was skipped for a reason containing `reason`.
pub fn assert_skipped_with(execution: &ScheduledExecution, reason: &str) {
    assert_execution_status(execution, ExecutionStatus::Skipped);
    let actual = execution.metadata.skip_reason.as_deref().unwrap_or_default();
    assert!(
        actual.contains(reason),
        "Expected skip reason containing '{reason}', got '{actual}'"
    );
}

/// Asserts that an execution was triggered by `cause`.
pub fn assert_triggered_by(execution: &ScheduledExecution, cause: TriggerCause) {
    assert_eq!(
        execution.triggered_by(),
        cause,
        "Expected execution '{}' to be triggered by {cause}",
        execution.id
    );
}
