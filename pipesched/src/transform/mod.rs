//! Transformation and validation rule engines for JSON records.
//!
//! A [`RuleSet`] applies its transforms to every record in order, then checks
//! each record against its validation rules. Records that fail any transform or
//! rule are dropped from the output and reported in a [`ValidationReport`].

mod rules;
mod validation;

pub use rules::{FieldType, TransformRule};
pub use validation::{ValidationReport, ValidationRule, Violation};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// A single record: a JSON object.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// A rule failure on a specific field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    /// Offending field.
    pub field: String,
    /// Detail.
    pub message: String,
}

impl FieldError {
    /// Creates a new field error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors in a rule set definition.
#[derive(Debug, Error)]
pub enum RuleSetError {
    /// A `pattern` rule holds an invalid regular expression.
    #[error("Invalid pattern for field '{field}': {source}")]
    InvalidPattern {
        /// Field the rule checks.
        field: String,
        /// Compile error.
        #[source]
        source: regex::Error,
    },
}

/// Output of [`RuleSet::process`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedBatch {
    /// Records that passed every transform and rule.
    pub records: Vec<Record>,
    /// Batch summary.
    pub report: ValidationReport,
}

/// Ordered transforms followed by validation rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Applied in order to each record.
    #[serde(default)]
    pub transforms: Vec<TransformRule>,
    /// Checked after all transforms.
    #[serde(default)]
    pub validations: Vec<ValidationRule>,
}

impl RuleSet {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transform.
    #[must_use]
    pub fn with_transform(mut self, rule: TransformRule) -> Self {
        self.transforms.push(rule);
        self
    }

    /// Appends a validation rule.
    #[must_use]
    pub fn with_validation(mut self, rule: ValidationRule) -> Self {
        self.validations.push(rule);
        self
    }

    /// Compiles every `pattern` rule.
    ///
    /// # Errors
    ///
    /// Returns [`RuleSetError::InvalidPattern`] for the first bad expression.
    pub fn compile_patterns(&self) -> Result<HashMap<String, Regex>, RuleSetError> {
        let mut patterns = HashMap::new();
        for rule in &self.validations {
            if let ValidationRule::Pattern { field, pattern } = rule {
                if patterns.contains_key(pattern) {
                    continue;
                }
                let re = Regex::new(pattern).map_err(|source| RuleSetError::InvalidPattern {
                    field: field.clone(),
                    source,
                })?;
                patterns.insert(pattern.clone(), re);
            }
        }
        Ok(patterns)
    }

    /// Transforms and validates a batch.
    ///
    /// # Errors
    ///
    /// Returns an error only if the rule set itself is invalid; bad records
    /// are reported, not raised.
    pub fn process(&self, records: Vec<Record>) -> Result<ProcessedBatch, RuleSetError> {
        let patterns = self.compile_patterns()?;
        let total = records.len();
        let mut kept = Vec::with_capacity(total);
        let mut violations = Vec::new();

        for (index, mut record) in records.into_iter().enumerate() {
            let mut failed = false;

            for rule in &self.transforms {
                if let Err(err) = rule.apply(&mut record) {
                    violations.push(violation(index, rule.name(), err));
                    failed = true;
                    break;
                }
            }

            if !failed {
                for rule in &self.validations {
                    if let Err(err) = rule.check(&record, &patterns) {
                        violations.push(violation(index, rule.name(), err));
                        failed = true;
                    }
                }
            }

            if !failed {
                kept.push(record);
            }
        }

        let report = ValidationReport::new(total, kept.len(), violations);
        debug!(
            total = report.total,
            valid = report.valid,
            quality_score = report.quality_score,
            "Processed record batch"
        );

        Ok(ProcessedBatch { records: kept, report })
    }
}

fn violation(record_index: usize, rule: &str, err: FieldError) -> Violation {
    Violation {
        record_index,
        field: err.field,
        rule: rule.to_string(),
        message: err.message,
    }
}
