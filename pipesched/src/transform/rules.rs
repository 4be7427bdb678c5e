//! Field-level transformation rules.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::fmt;

use super::{FieldError, Record};

/// JSON value kinds used by casts and type checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// A JSON string.
    String,
    /// A JSON number.
    Number,
    /// A JSON boolean.
    Boolean,
    /// A JSON object.
    Object,
    /// A JSON array.
    Array,
}

impl FieldType {
    /// Returns true if `value` is of this type.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Object => write!(f, "object"),
            Self::Array => write!(f, "array"),
        }
    }
}

/// A single record transformation, applied in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformRule {
    /// Moves `from` to `to`, overwriting any existing `to`.
    Rename {
        /// Source field.
        from: String,
        /// Destination field.
        to: String,
    },
    /// Sets `field` to `value` when absent or null.
    SetDefault {
        /// Target field.
        field: String,
        /// Value to insert.
        value: Value,
    },
    /// Converts `field` to a scalar type.
    Cast {
        /// Target field.
        field: String,
        /// Type to convert to.
        to: FieldType,
    },
    /// Trims surrounding whitespace from a string field.
    Trim {
        /// Target field.
        field: String,
    },
    /// Lowercases a string field.
    Lowercase {
        /// Target field.
        field: String,
    },
    /// Multiplies a numeric field.
    Scale {
        /// Target field.
        field: String,
        /// Multiplier.
        factor: f64,
    },
    /// Removes a field.
    Drop {
        /// Target field.
        field: String,
    },
}

impl TransformRule {
    /// Short rule name used in violation reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rename { .. } => "rename",
            Self::SetDefault { .. } => "set_default",
            Self::Cast { .. } => "cast",
            Self::Trim { .. } => "trim",
            Self::Lowercase { .. } => "lowercase",
            Self::Scale { .. } => "scale",
            Self::Drop { .. } => "drop",
        }
    }

    /// Applies the rule to a record in place.
    ///
    /// Missing fields are left alone by every rule except `set_default`.
    ///
    /// # Errors
    ///
    /// Returns a [`FieldError`] when the present value cannot be converted.
    pub fn apply(&self, record: &mut Record) -> Result<(), FieldError> {
        match self {
            Self::Rename { from, to } => {
                if let Some(value) = record.remove(from) {
                    record.insert(to.clone(), value);
                }
            }
            Self::SetDefault { field, value } => {
                let missing = record.get(field).map_or(true, Value::is_null);
                if missing {
                    record.insert(field.clone(), value.clone());
                }
            }
            Self::Cast { field, to } => {
                if let Some(value) = record.get_mut(field) {
                    *value = cast(field, value, *to)?;
                }
            }
            Self::Trim { field } => {
                if let Some(Value::String(s)) = record.get_mut(field) {
                    *s = s.trim().to_string();
                }
            }
            Self::Lowercase { field } => {
                if let Some(Value::String(s)) = record.get_mut(field) {
                    *s = s.to_lowercase();
                }
            }
            Self::Scale { field, factor } => {
                if let Some(value) = record.get_mut(field) {
                    let n = value
                        .as_f64()
                        .ok_or_else(|| FieldError::new(field, "cannot scale a non-numeric value"))?;
                    *value = number(field, n * factor)?;
                }
            }
            Self::Drop { field } => {
                record.remove(field);
            }
        }
        Ok(())
    }
}

fn number(field: &str, n: f64) -> Result<Value, FieldError> {
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| FieldError::new(field, format!("{n} is not a finite number")))
}

fn cast(field: &str, value: &Value, to: FieldType) -> Result<Value, FieldError> {
    if value.is_null() || to.matches(value) {
        return Ok(value.clone());
    }

    match (to, value) {
        (FieldType::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (FieldType::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),
        (FieldType::Number, Value::String(s)) => {
            let n: f64 = s
                .trim()
                .parse()
                .map_err(|_| FieldError::new(field, format!("'{s}' is not a number")))?;
            number(field, n)
        }
        (FieldType::Number, Value::Bool(b)) => Ok(Value::from(u8::from(*b))),
        (FieldType::Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Value::Bool(true)),
            "false" | "no" | "0" => Ok(Value::Bool(false)),
            _ => Err(FieldError::new(field, format!("'{s}' is not a boolean"))),
        },
        (FieldType::Boolean, Value::Number(n)) => Ok(Value::Bool(n.as_f64().is_some_and(|v| v != 0.0))),
        _ => Err(FieldError::new(field, format!("cannot cast {value} to {to}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_rename_and_drop() {
        let mut r = record(json!({"campaign": "spring", "tmp": 1}));
        TransformRule::Rename { from: "campaign".into(), to: "campaign_id".into() }
            .apply(&mut r)
            .unwrap();
        TransformRule::Drop { field: "tmp".into() }.apply(&mut r).unwrap();

        assert_eq!(Value::Object(r), json!({"campaign_id": "spring"}));
    }

    #[test]
    fn test_set_default_only_when_missing_or_null() {
        let mut r = record(json!({"channel": null, "region": "eu"}));
        TransformRule::SetDefault { field: "channel".into(), value: json!("organic") }
            .apply(&mut r)
            .unwrap();
        TransformRule::SetDefault { field: "region".into(), value: json!("us") }
            .apply(&mut r)
            .unwrap();

        assert_eq!(r["channel"], json!("organic"));
        assert_eq!(r["region"], json!("eu"));
    }

    #[test]
    fn test_cast_string_to_number() {
        let mut r = record(json!({"spend": " 12.5 "}));
        TransformRule::Cast { field: "spend".into(), to: FieldType::Number }
            .apply(&mut r)
            .unwrap();
        assert_eq!(r["spend"], json!(12.5));
    }

    #[test]
    fn test_cast_failure_reports_field() {
        let mut r = record(json!({"spend": "lots"}));
        let err = TransformRule::Cast { field: "spend".into(), to: FieldType::Number }
            .apply(&mut r)
            .unwrap_err();
        assert_eq!(err.field, "spend");
    }

    #[test]
    fn test_cast_to_boolean() {
        let mut r = record(json!({"active": "Yes", "paused": 0}));
        TransformRule::Cast { field: "active".into(), to: FieldType::Boolean }
            .apply(&mut r)
            .unwrap();
        TransformRule::Cast { field: "paused".into(), to: FieldType::Boolean }
            .apply(&mut r)
            .unwrap();
        assert_eq!(r["active"], json!(true));
        assert_eq!(r["paused"], json!(false));
    }

    #[test]
    fn test_trim_lowercase_scale() {
        let mut r = record(json!({"email": "  Ops@Example.COM ", "ctr": 0.25}));
        TransformRule::Trim { field: "email".into() }.apply(&mut r).unwrap();
        TransformRule::Lowercase { field: "email".into() }.apply(&mut r).unwrap();
        TransformRule::Scale { field: "ctr".into(), factor: 100.0 }.apply(&mut r).unwrap();

        assert_eq!(r["email"], json!("ops@example.com"));
        assert_eq!(r["ctr"], json!(25.0));
    }

    #[test]
    fn test_rule_deserialize() {
        let rule: TransformRule =
            serde_json::from_str(r#"{"op": "scale", "field": "ctr", "factor": 100}"#).unwrap();
        assert_eq!(rule.name(), "scale");
    }
}
