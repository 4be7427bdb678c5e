//! Per-node circuit breakers.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::config::CircuitBreakerConfig;

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    #[default]
    Closed,
    /// Calls are rejected until `next_attempt`.
    Open,
    /// One trial call is allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// State of one (workflow, node) breaker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    /// Consecutive failures.
    pub failure_count: u32,
    /// Most recent failure.
    pub last_failure: Option<DateTime<Utc>>,
    /// Position.
    pub state: CircuitState,
    /// Earliest time an open breaker lets a trial through.
    pub next_attempt: Option<DateTime<Utc>>,
}

/// Outcome of asking a breaker for permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call may proceed.
    Allowed,
    /// The breaker is open until the given time.
    Rejected {
        /// When a trial will be allowed.
        retry_after: DateTime<Utc>,
    },
}

type BreakerKey = (String, String);

/// Breakers keyed by (workflow id, node id).
#[derive(Debug, Default)]
pub struct CircuitBreakers {
    breakers: DashMap<BreakerKey, CircuitBreakerState>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakers {
    /// Creates an empty set of breakers.
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    fn key(workflow_id: &str, node_id: &str) -> BreakerKey {
        (workflow_id.to_string(), node_id.to_string())
    }

    /// Checks whether a call may proceed, moving an expired open breaker to half-open.
    pub fn admit(&self, workflow_id: &str, node_id: &str, now: DateTime<Utc>) -> Admission {
        let Some(mut breaker) = self.breakers.get_mut(&Self::key(workflow_id, node_id)) else {
            return Admission::Allowed;
        };

        if breaker.state != CircuitState::Open {
            return Admission::Allowed;
        }

        match breaker.next_attempt {
            Some(next) if now < next => Admission::Rejected { retry_after: next },
            _ => {
                breaker.state = CircuitState::HalfOpen;
                info!(workflow_id, node_id, "Circuit breaker half-open");
                Admission::Allowed
            }
        }
    }

    /// Records a failure. Returns the resulting state.
    pub fn record_failure(&self, workflow_id: &str, node_id: &str, now: DateTime<Utc>) -> CircuitState {
        let mut breaker = self.breakers.entry(Self::key(workflow_id, node_id)).or_default();

        breaker.failure_count = breaker.failure_count.saturating_add(1);
        breaker.last_failure = Some(now);

        let trip = match breaker.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => breaker.failure_count >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if trip {
            breaker.state = CircuitState::Open;
            breaker.next_attempt = Some(now + self.config.reset_timeout());
            warn!(
                workflow_id,
                node_id,
                failures = breaker.failure_count,
                "Circuit breaker opened"
            );
        }
        breaker.state
    }

    /// Records a success: closes the breaker and clears the failure count.
    pub fn record_success(&self, workflow_id: &str, node_id: &str) {
        if let Some(mut breaker) = self.breakers.get_mut(&Self::key(workflow_id, node_id)) {
            if breaker.state == CircuitState::HalfOpen {
                info!(workflow_id, node_id, "Circuit breaker closed");
            }
            breaker.state = CircuitState::Closed;
            breaker.failure_count = 0;
            breaker.next_attempt = None;
        }
    }

    /// Returns a copy of one breaker's state.
    #[must_use]
    pub fn state(&self, workflow_id: &str, node_id: &str) -> Option<CircuitBreakerState> {
        self.breakers
            .get(&Self::key(workflow_id, node_id))
            .map(|breaker| breaker.clone())
    }

    /// Forgets one breaker.
    pub fn reset(&self, workflow_id: &str, node_id: &str) {
        self.breakers.remove(&Self::key(workflow_id, node_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap()
    }

    fn breakers() -> CircuitBreakers {
        CircuitBreakers::new(CircuitBreakerConfig::default())
    }

    #[test]
    fn test_unknown_key_is_allowed() {
        assert_eq!(breakers().admit("wf", "node", t0()), Admission::Allowed);
    }

    #[test]
    fn test_opens_after_threshold() {
        let b = breakers();
        for _ in 0..4 {
            assert_eq!(b.record_failure("wf", "node", t0()), CircuitState::Closed);
        }
        assert_eq!(b.record_failure("wf", "node", t0()), CircuitState::Open);

        let state = b.state("wf", "node").unwrap();
        assert_eq!(state.failure_count, 5);
        assert_eq!(state.next_attempt, Some(t0() + Duration::seconds(60)));
        assert_eq!(
            b.admit("wf", "node", t0() + Duration::seconds(59)),
            Admission::Rejected { retry_after: t0() + Duration::seconds(60) }
        );
    }

    #[test]
    fn test_half_open_then_success_closes() {
        let b = breakers();
        for _ in 0..5 {
            b.record_failure("wf", "node", t0());
        }

        assert_eq!(b.admit("wf", "node", t0() + Duration::seconds(60)), Admission::Allowed);
        assert_eq!(b.state("wf", "node").unwrap().state, CircuitState::HalfOpen);

        b.record_success("wf", "node");
        let state = b.state("wf", "node").unwrap();
        assert_eq!(state.state, CircuitState::Closed);
        assert_eq!(state.failure_count, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let b = breakers();
        for _ in 0..5 {
            b.record_failure("wf", "node", t0());
        }
        let later = t0() + Duration::seconds(61);
        b.admit("wf", "node", later);

        assert_eq!(b.record_failure("wf", "node", later), CircuitState::Open);
        assert_eq!(
            b.state("wf", "node").unwrap().next_attempt,
            Some(later + Duration::seconds(60))
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let b = breakers();
        for _ in 0..5 {
            b.record_failure("wf", "a", t0());
        }
        assert_eq!(b.admit("wf", "b", t0()), Admission::Allowed);
        assert_eq!(b.admit("other", "a", t0()), Admission::Allowed);

        b.reset("wf", "a");
        assert!(b.state("wf", "a").is_none());
    }
}
