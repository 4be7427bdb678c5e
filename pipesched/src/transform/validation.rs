//! Record validation rules and batch reports.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::{FieldError, FieldType, Record};

/// A single validation rule.
///
/// Rules other than `required` pass when the field is absent or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum ValidationRule {
    /// Field must be present and non-null.
    Required {
        /// Checked field.
        field: String,
    },
    /// Field must be of the given type.
    Type {
        /// Checked field.
        field: String,
        /// Expected type.
        expected: FieldType,
    },
    /// Numeric field must fall in `[min, max]`.
    Range {
        /// Checked field.
        field: String,
        /// Inclusive lower bound.
        #[serde(default)]
        min: Option<f64>,
        /// Inclusive upper bound.
        #[serde(default)]
        max: Option<f64>,
    },
    /// String field must match a regular expression.
    Pattern {
        /// Checked field.
        field: String,
        /// Regular expression.
        pattern: String,
    },
    /// Field must equal one of the listed values.
    OneOf {
        /// Checked field.
        field: String,
        /// Allowed values.
        values: Vec<Value>,
    },
}

impl ValidationRule {
    /// Short rule name used in violation reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Required { .. } => "required",
            Self::Type { .. } => "type",
            Self::Range { .. } => "range",
            Self::Pattern { .. } => "pattern",
            Self::OneOf { .. } => "one_of",
        }
    }

    /// The field this rule checks.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Required { field }
            | Self::Type { field, .. }
            | Self::Range { field, .. }
            | Self::Pattern { field, .. }
            | Self::OneOf { field, .. } => field,
        }
    }

    /// Checks a record. `patterns` holds compiled regexes keyed by pattern text.
    pub(crate) fn check(&self, record: &Record, patterns: &HashMap<String, Regex>) -> Result<(), FieldError> {
        let field = self.field();
        let value = record.get(field).filter(|v| !v.is_null());

        let Some(value) = value else {
            return match self {
                Self::Required { .. } => Err(FieldError::new(field, "is required")),
                _ => Ok(()),
            };
        };

        match self {
            Self::Required { .. } => Ok(()),
            Self::Type { expected, .. } => {
                if expected.matches(value) {
                    Ok(())
                } else {
                    Err(FieldError::new(field, format!("expected {expected}")))
                }
            }
            Self::Range { min, max, .. } => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| FieldError::new(field, "expected number"))?;
                if min.is_some_and(|m| n < m) || max.is_some_and(|m| n > m) {
                    return Err(FieldError::new(field, format!("{n} out of range")));
                }
                Ok(())
            }
            Self::Pattern { pattern, .. } => {
                let s = value
                    .as_str()
                    .ok_or_else(|| FieldError::new(field, "expected string"))?;
                match patterns.get(pattern) {
                    Some(re) if re.is_match(s) => Ok(()),
                    _ => Err(FieldError::new(field, format!("'{s}' does not match {pattern}"))),
                }
            }
            Self::OneOf { values, .. } => {
                if values.contains(value) {
                    Ok(())
                } else {
                    Err(FieldError::new(field, format!("{value} is not an allowed value")))
                }
            }
        }
    }
}

/// One rule failure on one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Position of the record in the input batch.
    pub record_index: usize,
    /// Offending field.
    pub field: String,
    /// Rule name.
    pub rule: String,
    /// Detail.
    pub message: String,
}

/// Summary of a processed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Records in the input batch.
    pub total: usize,
    /// Records that passed every rule.
    pub valid: usize,
    /// Records rejected.
    pub invalid: usize,
    /// Every rule failure, in record order.
    pub violations: Vec<Violation>,
    /// `valid / total`, or `1.0` for an empty batch.
    pub quality_score: f64,
}

impl ValidationReport {
    pub(crate) fn new(total: usize, valid: usize, violations: Vec<Violation>) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let quality_score = if total == 0 { 1.0 } else { valid as f64 / total as f64 };
        Self {
            total,
            valid,
            invalid: total - valid,
            violations,
            quality_score,
        }
    }
}
