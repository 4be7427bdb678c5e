//! Testing utilities for scheduler hosts.
//!
//! This module provides:
//! - Scripted and failing executors
//! - A recording health checker
//! - In-memory record source and sink for ETL executors
//! - Assertions over execution records

mod assertions;
mod mocks;

pub use assertions::{assert_execution_status, assert_skipped_with, assert_triggered_by};
pub use mocks::{
    FailingExecutor, InMemoryRecordSink, InMemoryRecordSource, RecordingHealthChecker, ScriptedExecutor,
};
