//! # Pipesched
//!
//! Dependency-aware scheduling for recurring data pipelines.
//!
//! Pipesched runs registered pipelines on cron-like cadences with support for:
//!
//! - **Dependency gating and fan-out**: a pipeline runs only after its dependencies
//!   completed, and a completed run triggers its dependents
//! - **Execution windows and health checks**: per-pipeline gates evaluated before each run
//! - **Retry with backoff**: structured executor errors drive retry decisions
//! - **Monitoring**: stuck runs are relabeled and old records evicted on a fixed interval
//! - **Transform rules and ETL**: declarative record transforms and validations
//! - **Workflow error recovery**: classification, circuit breakers and escalation tickets
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pipesched::prelude::*;
//!
//! let registry = ScheduleRegistry::from_schedules(vec![
//!     PipelineSchedule::new("extract", "@hourly"),
//!     PipelineSchedule::new("load", "@hourly").with_dependency("extract"),
//! ])?;
//!
//! let scheduler = PipelineScheduler::builder(registry, Arc::new(MyExecutor))
//!     .event_sink(Arc::new(LoggingEventSink::default()))
//!     .build()?;
//!
//! scheduler.start().await;
//! let run = scheduler.manual_trigger("extract").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod executor;
pub mod observability;
pub mod recovery;
pub mod schedule;
pub mod scheduler;
pub mod testing;
pub mod tracker;
pub mod transform;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{HealthCheckMode, SchedulerConfig};
    pub use crate::core::{ExecutionStatus, ScheduledExecution, TriggerCause};
    pub use crate::errors::{CadenceError, ConfigError, SchedulerError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::executor::{
        EtlExecutor, ExecutorError, ExecutorErrorKind, HealthChecker, PipelineExecutor, PipelineRun,
    };
    pub use crate::recovery::{ErrorContext, RecoveryAction, WorkflowError, WorkflowErrorHandler};
    pub use crate::schedule::{
        ExecutionWindow, HealthCheckDescriptor, HealthCheckType, PipelineSchedule, RetryPolicy,
        ScheduleRegistry,
    };
    pub use crate::scheduler::{PipelineScheduler, SchedulerStatus};
    pub use crate::transform::{Record, RuleSet, TransformRule, ValidationRule};
    pub use crate::utils::{Clock, SystemClock};
    pub use std::sync::Arc;
}
