//! Pipeline schedules and the registry that holds them.
//!
//! This module provides:
//! - The per-pipeline [`PipelineSchedule`] configuration
//! - The cadence interpreter and execution windows
//! - Retry policies and health check descriptors
//! - The validated [`ScheduleRegistry`]

mod cadence;
mod defaults;
mod health;
mod registry;
mod retry;
mod definition;
mod window;

pub use cadence::Cadence;
pub use defaults::builtin_schedules;
pub use health::{HealthCheckDescriptor, HealthCheckType};
pub use registry::ScheduleRegistry;
pub use retry::{JitterStrategy, RetryDecision, RetryPolicy};
pub use definition::PipelineSchedule;
pub use window::ExecutionWindow;
