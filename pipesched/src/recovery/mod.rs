//! Error classification and recovery for workflow nodes.
//!
//! This subsystem is independent of the pipeline scheduler: pipeline retries
//! are driven by [`RetryPolicy`](crate::schedule::RetryPolicy) and structured
//! executor error kinds, while [`WorkflowErrorHandler`] serves general workflow
//! nodes whose failures may arrive as free text.

mod circuit_breaker;
mod classify;
mod handler;

pub use circuit_breaker::{Admission, CircuitBreakerState, CircuitBreakers, CircuitState};
pub use classify::{
    ClassificationSource, ErrorCategory, ErrorClassification, ErrorClassifier, ErrorSeverity,
    RecoveryStrategy, WorkflowError,
};
pub use handler::{
    ErrorContext, ErrorRecord, EscalationTicket, RecoveryAction, RecoveryOutcome, WorkflowErrorHandler,
};
