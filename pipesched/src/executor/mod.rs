//! Collaborator interfaces the scheduler calls out to.
//!
//! The pipeline executor and health checker are external: the scheduler
//! treats them as opaque async calls. Executors report failures as a
//! structured [`ExecutorError`] so retry decisions never depend on message text.

mod etl;
mod health;

pub use etl::{EtlExecutor, RecordSink, RecordSource};
pub use health::{
    HealthCheckResult, HealthChecker, MetricsHealthChecker, MetricsProbe, NoOpHealthChecker,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Structured category of an executor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorErrorKind {
    /// Could not reach a source or destination.
    Connection,
    /// The run exceeded a time budget.
    Timeout,
    /// A provider throttled the run.
    RateLimited,
    /// A source reported itself unavailable.
    SourceUnavailable,
    /// Credentials were rejected.
    Authentication,
    /// Input data failed validation.
    Validation,
    /// The batch quality score was below the acceptable minimum.
    DataQuality,
    /// Any other failure inside the executor.
    Internal,
}

impl fmt::Display for ExecutorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Timeout => write!(f, "timeout"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::SourceUnavailable => write!(f, "source_unavailable"),
            Self::Authentication => write!(f, "authentication"),
            Self::Validation => write!(f, "validation"),
            Self::DataQuality => write!(f, "data_quality"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// A failure reported by a pipeline executor.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ExecutorError {
    /// Failure category.
    pub kind: ExecutorErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl ExecutorError {
    /// Creates a new executor error.
    #[must_use]
    pub fn new(kind: ExecutorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ExecutorErrorKind::Connection, message)
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ExecutorErrorKind::Timeout, message)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ExecutorErrorKind::Internal, message)
    }
}

/// Successful result of one executor call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Records extracted, transformed and loaded.
    pub records_processed: u64,
    /// Data quality score in `0.0..=1.0`.
    pub data_quality_score: f64,
    /// Processing time as measured by the executor.
    pub processing_time_ms: u64,
    /// When the executor finished.
    pub timestamp: DateTime<Utc>,
}

impl PipelineRun {
    /// Creates a run result stamped with the current time.
    #[must_use]
    pub fn new(records_processed: u64, data_quality_score: f64, processing_time_ms: u64) -> Self {
        Self {
            records_processed,
            data_quality_score,
            processing_time_ms,
            timestamp: Utc::now(),
        }
    }
}

/// Performs extraction, transformation and loading for a pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    /// Runs the pipeline once.
    ///
    /// # Errors
    ///
    /// Returns a structured [`ExecutorError`] describing why the run failed.
    async fn execute(&self, pipeline_id: &str) -> Result<PipelineRun, ExecutorError>;
}
