//! Error classification for workflow node failures.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Broad error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Connectivity problems.
    Network,
    /// Rejected credentials.
    Authentication,
    /// Valid credentials without permission.
    Authorization,
    /// Bad input.
    Validation,
    /// A domain rule was violated.
    BusinessLogic,
    /// A third-party API misbehaved.
    ExternalApi,
    /// Storage layer failure.
    Database,
    /// An operation ran out of time.
    Timeout,
    /// A provider throttled the caller.
    RateLimit,
    /// Host-level failure.
    System,
    /// Nothing matched.
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::Validation => "validation",
            Self::BusinessLogic => "business_logic",
            Self::ExternalApi => "external_api",
            Self::Database => "database",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::System => "system",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// How bad an error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Cosmetic or easily skipped.
    Low,
    /// Degrades a run.
    Medium,
    /// Breaks a run.
    High,
    /// Breaks the system.
    Critical,
}

/// What the handler should do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Try again after a delay.
    Retry,
    /// Substitute data and continue.
    Fallback,
    /// Bypass the node.
    Skip,
    /// Raise a ticket.
    Escalate,
    /// Raise a ticket and wait for a human.
    ManualIntervention,
    /// Retry, guarded by the node's circuit breaker.
    CircuitBreaker,
}

/// Where a classification came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// The producer supplied a category.
    Structured,
    /// A pattern in the table matched.
    Pattern,
    /// A keyword heuristic matched.
    Heuristic,
    /// Nothing matched.
    Fallthrough,
}

/// Result of classifying one error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    /// Category.
    pub category: ErrorCategory,
    /// Severity.
    pub severity: ErrorSeverity,
    /// Likely to succeed on retry.
    pub is_transient: bool,
    /// Some automatic recovery is possible.
    pub is_recoverable: bool,
    /// Recommended strategy.
    pub strategy: RecoveryStrategy,
    /// Where the classification came from.
    pub source: ClassificationSource,
}

impl ErrorCategory {
    /// Default classification for errors known to be in this category.
    #[must_use]
    pub fn default_classification(self) -> ErrorClassification {
        use ErrorSeverity::{Critical, High, Low, Medium};
        use RecoveryStrategy::{CircuitBreaker, Escalate, ManualIntervention, Retry, Skip};

        let (severity, is_transient, is_recoverable, strategy) = match self {
            Self::Network | Self::Timeout | Self::RateLimit => (Medium, true, true, Retry),
            Self::Authentication => (High, false, false, ManualIntervention),
            Self::Authorization => (High, false, false, Escalate),
            Self::Validation => (Low, false, true, Skip),
            Self::BusinessLogic => (Medium, false, true, Escalate),
            Self::ExternalApi => (Medium, true, true, CircuitBreaker),
            Self::Database => (High, true, true, Retry),
            Self::System => (Critical, false, false, ManualIntervention),
            Self::Unknown => (Medium, false, true, Escalate),
        };

        ErrorClassification {
            category: self,
            severity,
            is_transient,
            is_recoverable,
            strategy,
            source: ClassificationSource::Structured,
        }
    }
}

/// A failure reported by a workflow node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowError {
    /// Error text.
    pub message: String,
    /// Category supplied by the producer, if it knows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    /// Producer-specific code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl WorkflowError {
    /// An unstructured error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: None,
            code: None,
        }
    }

    /// An error whose category is already known.
    #[must_use]
    pub fn categorized(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category: Some(category),
            ..Self::new(message)
        }
    }

    /// Attaches a code. Codes take part in pattern matching.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

struct ErrorPattern {
    regex: Regex,
    category: ErrorCategory,
    severity: ErrorSeverity,
    is_transient: bool,
    strategy: RecoveryStrategy,
}

/// Maps errors to classifications.
///
/// Structured categories win; otherwise the pattern table is tried in order,
/// then keyword heuristics, then the `Unknown` default.
pub struct ErrorClassifier {
    patterns: Vec<ErrorPattern>,
}

impl fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorClassifier")
            .field("patterns", &self.patterns.len())
            .finish()
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        use ErrorCategory as C;
        use ErrorSeverity as S;
        use RecoveryStrategy as R;

        let mut classifier = Self::empty();
        // Upstream gateway failures come before the generic timeout pattern.
        let table = [
            (
                r"(?i)service unavailable|bad gateway|gateway timeout|\b50[234]\b",
                C::ExternalApi,
                S::Medium,
                true,
                R::CircuitBreaker,
            ),
            (r"(?i)timeout|timed out", C::Network, S::Medium, true, R::Retry),
            (
                r"(?i)econnrefused|econnreset|enotfound|connection (refused|reset)|network",
                C::Network,
                S::Medium,
                true,
                R::Retry,
            ),
            (r"(?i)rate limit|too many requests|\b429\b", C::RateLimit, S::Medium, true, R::Retry),
            (
                r"(?i)unauthorized|unauthenticated|invalid token|token expired|\b401\b",
                C::Authentication,
                S::High,
                false,
                R::ManualIntervention,
            ),
            (r"(?i)forbidden|permission denied|\b403\b", C::Authorization, S::High, false, R::Escalate),
            (
                r"(?i)validation|invalid input|required field|malformed",
                C::Validation,
                S::Low,
                false,
                R::Skip,
            ),
            (r"(?i)deadlock|database|sql|constraint violation", C::Database, S::High, true, R::Retry),
            (r"(?i)out of memory|enomem|disk full|enospc", C::System, S::Critical, false, R::ManualIntervention),
        ];

        for (pattern, category, severity, is_transient, strategy) in table {
            if let Err(err) = classifier.add_pattern(pattern, category, severity, is_transient, strategy) {
                warn!(pattern, error = %err, "Skipping invalid classifier pattern");
            }
        }
        classifier
    }
}

impl ErrorClassifier {
    /// A classifier with no patterns; only structured categories and heuristics apply.
    #[must_use]
    pub fn empty() -> Self {
        Self { patterns: Vec::new() }
    }

    /// Appends a pattern. Earlier patterns take precedence.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error.
    pub fn add_pattern(
        &mut self,
        pattern: &str,
        category: ErrorCategory,
        severity: ErrorSeverity,
        is_transient: bool,
        strategy: RecoveryStrategy,
    ) -> Result<(), regex::Error> {
        self.patterns.push(ErrorPattern {
            regex: Regex::new(pattern)?,
            category,
            severity,
            is_transient,
            strategy,
        });
        Ok(())
    }

    /// Classifies an error.
    #[must_use]
    pub fn classify(&self, error: &WorkflowError) -> ErrorClassification {
        if let Some(category) = error.category {
            return category.default_classification();
        }

        let haystack = match &error.code {
            Some(code) => format!("{code} {}", error.message),
            None => error.message.clone(),
        };

        if let Some(pattern) = self.patterns.iter().find(|p| p.regex.is_match(&haystack)) {
            return ErrorClassification {
                category: pattern.category,
                severity: pattern.severity,
                is_transient: pattern.is_transient,
                is_recoverable: pattern.is_transient || pattern.strategy == RecoveryStrategy::Skip,
                strategy: pattern.strategy,
                source: ClassificationSource::Pattern,
            };
        }

        if let Some(category) = heuristic_category(&haystack.to_lowercase()) {
            return ErrorClassification {
                source: ClassificationSource::Heuristic,
                ..category.default_classification()
            };
        }

        ErrorClassification {
            source: ClassificationSource::Fallthrough,
            ..ErrorCategory::Unknown.default_classification()
        }
    }
}

fn heuristic_category(message: &str) -> Option<ErrorCategory> {
    const KEYWORDS: &[(&[&str], ErrorCategory)] = &[
        (&["socket", "dns", "unreachable", "offline"], ErrorCategory::Network),
        (&["credential", "login", "password"], ErrorCategory::Authentication),
        (&["access denied", "not allowed", "role"], ErrorCategory::Authorization),
        (&["invalid", "missing", "expected", "parse"], ErrorCategory::Validation),
        (&["api", "upstream", "webhook", "provider"], ErrorCategory::ExternalApi),
        (&["query", "transaction", "postgres", "table"], ErrorCategory::Database),
        (&["quota", "throttl"], ErrorCategory::RateLimit),
        (&["budget", "approval", "policy", "business"], ErrorCategory::BusinessLogic),
        (&["panic", "crash", "memory", "disk"], ErrorCategory::System),
    ];

    KEYWORDS
        .iter()
        .find(|(words, _)| words.iter().any(|word| message.contains(word)))
        .map(|(_, category)| *category)
}
