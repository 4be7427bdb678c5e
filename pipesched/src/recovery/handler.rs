//! Workflow error handler: classify, consult the breaker, pick a recovery action.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    Admission, CircuitBreakerState, CircuitBreakers, CircuitState, ErrorCategory, ErrorClassification,
    ErrorClassifier, ErrorSeverity, RecoveryStrategy, WorkflowError,
};
use crate::config::ErrorHandlerConfig;
use crate::utils::{Clock, SystemClock};

/// Where an error happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Workflow id.
    pub workflow_id: String,
    /// Node id within the workflow.
    pub node_id: String,
    /// 1-based attempt that produced the error.
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    /// Caller-supplied details.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

fn first_attempt() -> u32 {
    1
}

impl ErrorContext {
    /// Creates a context for the first attempt.
    #[must_use]
    pub fn new(workflow_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            node_id: node_id.into(),
            attempt: 1,
            metadata: HashMap::new(),
        }
    }

    /// Sets the attempt number.
    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A request for human attention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationTicket {
    /// Ticket id.
    pub id: Uuid,
    /// Workflow id.
    pub workflow_id: String,
    /// Node id.
    pub node_id: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Error severity.
    pub severity: ErrorSeverity,
    /// Error text.
    pub message: String,
    /// True when the node must wait for a human before continuing.
    pub requires_manual_intervention: bool,
    /// When the ticket was raised.
    pub created_at: DateTime<Utc>,
}

/// What the caller should do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Re-run the node after `delay`.
    Retry {
        /// Wait before retrying.
        #[serde(with = "duration_ms")]
        delay: Duration,
        /// The attempt number to use for the retry.
        next_attempt: u32,
    },
    /// Continue with substitute output.
    Fallback {
        /// Substitute output.
        data: Value,
    },
    /// Mark the node bypassed.
    Skip {
        /// Why.
        reason: String,
    },
    /// A ticket was raised; stop the node.
    Escalate {
        /// The ticket.
        ticket: EscalationTicket,
    },
    /// A ticket was raised; the node waits for a human.
    ManualIntervention {
        /// The ticket.
        ticket: EscalationTicket,
    },
    /// The node's breaker is open; nothing was classified.
    CircuitOpen {
        /// When a trial will be allowed.
        retry_after: DateTime<Utc>,
    },
}

impl RecoveryAction {
    /// Short action name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Retry { .. } => "retry",
            Self::Fallback { .. } => "fallback",
            Self::Skip { .. } => "skip",
            Self::Escalate { .. } => "escalate",
            Self::ManualIntervention { .. } => "manual_intervention",
            Self::CircuitOpen { .. } => "circuit_open",
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Result of handling one error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    /// Classification, absent when an open breaker short-circuited handling.
    pub classification: Option<ErrorClassification>,
    /// Next step.
    pub action: RecoveryAction,
}

/// One handled error in a workflow's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// When it was handled.
    pub timestamp: DateTime<Utc>,
    /// Node id.
    pub node_id: String,
    /// Error text.
    pub message: String,
    /// Classification.
    pub classification: ErrorClassification,
    /// Action name chosen.
    pub action: String,
}

/// Classifies workflow node errors and decides how to recover.
///
/// Every handled error counts as a failure on the node's circuit breaker.
/// Callers report successes through [`WorkflowErrorHandler::record_success`].
pub struct WorkflowErrorHandler {
    config: ErrorHandlerConfig,
    classifier: ErrorClassifier,
    breakers: CircuitBreakers,
    clock: Arc<dyn Clock>,
    fallbacks: HashMap<String, Value>,
    tickets: RwLock<Vec<EscalationTicket>>,
    history: DashMap<String, VecDeque<ErrorRecord>>,
}

impl std::fmt::Debug for WorkflowErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowErrorHandler")
            .field("config", &self.config)
            .field("classifier", &self.classifier)
            .field("tickets", &self.tickets.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for WorkflowErrorHandler {
    fn default() -> Self {
        Self::new(ErrorHandlerConfig::default())
    }
}

impl WorkflowErrorHandler {
    /// Creates a handler with the default classifier and the system clock.
    #[must_use]
    pub fn new(config: ErrorHandlerConfig) -> Self {
        Self {
            breakers: CircuitBreakers::new(config.circuit_breaker),
            config,
            classifier: ErrorClassifier::default(),
            clock: Arc::new(SystemClock),
            fallbacks: HashMap::new(),
            tickets: RwLock::new(Vec::new()),
            history: DashMap::new(),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Registers substitute output for a node, used by the fallback strategy.
    #[must_use]
    pub fn with_fallback(mut self, node_id: impl Into<String>, data: Value) -> Self {
        self.fallbacks.insert(node_id.into(), data);
        self
    }

    /// Handles one error.
    pub fn handle_error(&self, error: &WorkflowError, ctx: &ErrorContext) -> RecoveryOutcome {
        let now = self.clock.now();

        if let Admission::Rejected { retry_after } = self.breakers.admit(&ctx.workflow_id, &ctx.node_id, now) {
            warn!(
                workflow_id = %ctx.workflow_id,
                node_id = %ctx.node_id,
                %retry_after,
                "Circuit open, error not handled"
            );
            return RecoveryOutcome {
                classification: None,
                action: RecoveryAction::CircuitOpen { retry_after },
            };
        }

        let classification = self.classifier.classify(error);
        let breaker_state = self.breakers.record_failure(&ctx.workflow_id, &ctx.node_id, now);

        let mut strategy = classification.strategy;
        let retries_exhausted = ctx.attempt >= self.config.max_retries;
        if matches!(strategy, RecoveryStrategy::Retry | RecoveryStrategy::CircuitBreaker) && retries_exhausted {
            info!(
                workflow_id = %ctx.workflow_id,
                node_id = %ctx.node_id,
                attempt = ctx.attempt,
                "Retry limit reached, escalating"
            );
            strategy = RecoveryStrategy::Escalate;
        }

        let action = match strategy {
            RecoveryStrategy::Retry => self.retry_action(ctx),
            RecoveryStrategy::CircuitBreaker => match (breaker_state, self.breakers.state(&ctx.workflow_id, &ctx.node_id)) {
                (CircuitState::Open, Some(CircuitBreakerState { next_attempt: Some(retry_after), .. })) => {
                    RecoveryAction::CircuitOpen { retry_after }
                }
                _ => self.retry_action(ctx),
            },
            RecoveryStrategy::Fallback => RecoveryAction::Fallback {
                data: self.fallback_data(error, ctx),
            },
            RecoveryStrategy::Skip => RecoveryAction::Skip {
                reason: format!("{} error: {}", classification.category, error.message),
            },
            RecoveryStrategy::Escalate => RecoveryAction::Escalate {
                ticket: self.raise_ticket(error, ctx, &classification, false, now),
            },
            RecoveryStrategy::ManualIntervention => RecoveryAction::ManualIntervention {
                ticket: self.raise_ticket(error, ctx, &classification, true, now),
            },
        };

        self.remember(ctx, error, classification, action.name(), now);

        RecoveryOutcome {
            classification: Some(classification),
            action,
        }
    }

    /// Reports a successful node run, closing its breaker.
    pub fn record_success(&self, workflow_id: &str, node_id: &str) {
        self.breakers.record_success(workflow_id, node_id);
    }

    /// Returns a node's breaker state.
    #[must_use]
    pub fn circuit_state(&self, workflow_id: &str, node_id: &str) -> Option<CircuitBreakerState> {
        self.breakers.state(workflow_id, node_id)
    }

    /// Returns every ticket raised so far.
    #[must_use]
    pub fn tickets(&self) -> Vec<EscalationTicket> {
        self.tickets.read().clone()
    }

    /// Returns a workflow's recent errors, oldest first.
    #[must_use]
    pub fn error_history(&self, workflow_id: &str) -> Vec<ErrorRecord> {
        self.history
            .get(workflow_id)
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Counts a workflow's recent errors by category.
    #[must_use]
    pub fn error_counts(&self, workflow_id: &str) -> HashMap<ErrorCategory, usize> {
        let mut counts = HashMap::new();
        if let Some(records) = self.history.get(workflow_id) {
            for record in records.iter() {
                *counts.entry(record.classification.category).or_insert(0) += 1;
            }
        }
        counts
    }

    fn retry_action(&self, ctx: &ErrorContext) -> RecoveryAction {
        let exponent = ctx.attempt.saturating_sub(1).min(16);
        let delay_ms = self
            .config
            .retry_base_delay_ms
            .saturating_mul(1_u64 << exponent)
            .min(MAX_RETRY_DELAY_MS);
        RecoveryAction::Retry {
            delay: Duration::from_millis(delay_ms),
            next_attempt: ctx.attempt + 1,
        }
    }

    fn fallback_data(&self, error: &WorkflowError, ctx: &ErrorContext) -> Value {
        self.fallbacks.get(&ctx.node_id).cloned().unwrap_or_else(|| {
            json!({
                "fallback": true,
                "node_id": ctx.node_id,
                "reason": error.message,
            })
        })
    }

    fn raise_ticket(
        &self,
        error: &WorkflowError,
        ctx: &ErrorContext,
        classification: &ErrorClassification,
        manual: bool,
        now: DateTime<Utc>,
    ) -> EscalationTicket {
        let ticket = EscalationTicket {
            id: Uuid::new_v4(),
            workflow_id: ctx.workflow_id.clone(),
            node_id: ctx.node_id.clone(),
            category: classification.category,
            severity: classification.severity,
            message: error.message.clone(),
            requires_manual_intervention: manual,
            created_at: now,
        };
        error!(
            ticket_id = %ticket.id,
            workflow_id = %ticket.workflow_id,
            node_id = %ticket.node_id,
            category = %ticket.category,
            manual,
            "Escalation ticket raised: {}",
            ticket.message
        );
        self.tickets.write().push(ticket.clone());
        ticket
    }

    fn remember(
        &self,
        ctx: &ErrorContext,
        error: &WorkflowError,
        classification: ErrorClassification,
        action: &str,
        now: DateTime<Utc>,
    ) {
        let mut records = self.history.entry(ctx.workflow_id.clone()).or_default();
        records.push_back(ErrorRecord {
            timestamp: now,
            node_id: ctx.node_id.clone(),
            message: error.message.clone(),
            classification,
            action: action.to_string(),
        });
        while records.len() > self.config.history_limit {
            records.pop_front();
        }
    }
}

const MAX_RETRY_DELAY_MS: u64 = 60_000;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn handler() -> (WorkflowErrorHandler, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 4, 2, 8, 0, 0).unwrap()));
        let handler = WorkflowErrorHandler::default().with_clock(clock.clone());
        (handler, clock)
    }

    #[test]
    fn test_retry_with_backoff() {
        let (handler, _) = handler();
        let outcome = handler.handle_error(
            &WorkflowError::new("socket timeout"),
            &ErrorContext::new("wf", "fetch").with_attempt(2),
        );

        assert_eq!(outcome.classification.unwrap().category, ErrorCategory::Network);
        assert_eq!(
            outcome.action,
            RecoveryAction::Retry { delay: Duration::from_millis(2_000), next_attempt: 3 }
        );
    }

    #[test]
    fn test_retry_escalates_at_limit() {
        let (handler, _) = handler();
        let outcome = handler.handle_error(
            &WorkflowError::new("connection reset"),
            &ErrorContext::new("wf", "fetch").with_attempt(3),
        );

        assert!(matches!(outcome.action, RecoveryAction::Escalate { .. }));
        assert_eq!(handler.tickets().len(), 1);
    }

    #[test]
    fn test_skip_for_validation() {
        let (handler, _) = handler();
        let outcome = handler.handle_error(
            &WorkflowError::categorized(ErrorCategory::Validation, "email missing"),
            &ErrorContext::new("wf", "enrich"),
        );
        assert!(matches!(outcome.action, RecoveryAction::Skip { ref reason } if reason.contains("email missing")));
    }

    #[test]
    fn test_manual_intervention_ticket() {
        let (handler, _) = handler();
        let outcome = handler.handle_error(
            &WorkflowError::new("401 Unauthorized"),
            &ErrorContext::new("wf", "publish"),
        );

        match outcome.action {
            RecoveryAction::ManualIntervention { ticket } => {
                assert!(ticket.requires_manual_intervention);
                assert_eq!(ticket.category, ErrorCategory::Authentication);
                assert_eq!(handler.tickets()[0].id, ticket.id);
            }
            other => panic!("expected manual intervention, got {other:?}"),
        }
    }

    #[test]
    fn test_fallback_uses_registered_data() {
        let mut classifier = ErrorClassifier::empty();
        classifier
            .add_pattern("(?i)stale", ErrorCategory::ExternalApi, ErrorSeverity::Low, true, RecoveryStrategy::Fallback)
            .unwrap();
        let handler = WorkflowErrorHandler::default()
            .with_classifier(classifier)
            .with_fallback("metrics", json!({"impressions": 0}));

        let outcome = handler.handle_error(&WorkflowError::new("stale cache"), &ErrorContext::new("wf", "metrics"));
        assert_eq!(outcome.action, RecoveryAction::Fallback { data: json!({"impressions": 0}) });

        let outcome = handler.handle_error(&WorkflowError::new("stale cache"), &ErrorContext::new("wf", "other"));
        match outcome.action {
            RecoveryAction::Fallback { data } => assert_eq!(data["fallback"], json!(true)),
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let handler = WorkflowErrorHandler::new(ErrorHandlerConfig {
            history_limit: 3,
            ..ErrorHandlerConfig::default()
        });
        for i in 0..5 {
            handler.handle_error(
                &WorkflowError::new(format!("invalid row {i}")),
                &ErrorContext::new("wf", format!("node-{i}")),
            );
        }

        let history = handler.error_history("wf");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].message, "invalid row 2");
        assert_eq!(handler.error_counts("wf").get(&ErrorCategory::Validation), Some(&3));
        assert!(handler.error_history("unknown").is_empty());
    }
}
