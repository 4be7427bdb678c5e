//! Core domain model types for the scheduler.
//!
//! This module contains:
//! - Execution status, trigger cause and log level enums
//! - The execution record and its result/metadata parts

mod execution;
mod status;

pub use execution::{
    ExecutionLogEntry, ExecutionMetadata, ExecutionResult, PerformanceMetrics, ResourceUsage,
    RunOutcome, ScheduledExecution,
};
pub use status::{ExecutionStatus, LogLevel, TriggerCause};
