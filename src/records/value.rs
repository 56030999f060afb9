//! Typed coercion of raw JSON into field values.
//!
//! Every stored record value belongs to one of the declared field types.
//! Conversion is strict: a number field takes JSON numbers only, a date
//! field takes an RFC 3339 string, and so on. Null is accepted everywhere
//! and means "no value" regardless of type.

use chrono::DateTime;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::registry::{FieldDefinition, FieldType};

/// A validated field value, ready to be stored as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    Text(String),
    Number(serde_json::Number),
    Boolean(bool),
    /// RFC 3339 timestamp, kept in its string form
    Date(String),
    /// One of the field's declared choice values
    Choice(String),
    /// recordId of a row in the referenced table
    Reference(String),
}

impl TypedValue {
    /// Validates `raw` against the field's declared type and constraints.
    pub fn from_json(field: &FieldDefinition, raw: Value) -> EngineResult<Self> {
        if raw.is_null() {
            return Ok(Self::Null);
        }
        let name = field.field_name.as_str();
        match field.field_type {
            FieldType::Text => {
                let text = expect_string(name, raw, "a string")?;
                if let Some(max) = field.max_length {
                    if text.chars().count() > max {
                        return Err(EngineError::validation(
                            name,
                            format!("exceeds maximum length of {}", max),
                        ));
                    }
                }
                Ok(Self::Text(text))
            }
            FieldType::Number => match raw {
                Value::Number(n) => Ok(Self::Number(n)),
                other => Err(type_mismatch(name, "a number", &other)),
            },
            FieldType::Boolean => match raw {
                Value::Bool(b) => Ok(Self::Boolean(b)),
                other => Err(type_mismatch(name, "a boolean", &other)),
            },
            FieldType::Date => {
                let text = expect_string(name, raw, "an RFC 3339 date string")?;
                if DateTime::parse_from_rfc3339(&text).is_err() {
                    return Err(EngineError::validation(
                        name,
                        format!("'{}' is not a valid RFC 3339 timestamp", text),
                    ));
                }
                Ok(Self::Date(text))
            }
            FieldType::Choice => {
                let text = expect_string(name, raw, "a choice value")?;
                if let Some(options) = &field.choice_options {
                    if !options.iter().any(|o| o.value == text) {
                        return Err(EngineError::validation(
                            name,
                            format!("'{}' is not one of the declared choices", text),
                        ));
                    }
                }
                Ok(Self::Choice(text))
            }
            FieldType::Reference => {
                let text = expect_string(name, raw, "a record id")?;
                if text.is_empty() {
                    return Err(EngineError::validation(name, "reference id cannot be empty"));
                }
                Ok(Self::Reference(text))
            }
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The JSON representation stored in the row.
    pub fn into_json(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Text(s) | Self::Date(s) | Self::Choice(s) | Self::Reference(s) => {
                Value::String(s)
            }
            Self::Number(n) => Value::Number(n),
            Self::Boolean(b) => Value::Bool(b),
        }
    }
}

fn expect_string(field: &str, raw: Value, wanted: &str) -> EngineResult<String> {
    match raw {
        Value::String(s) => Ok(s),
        other => Err(type_mismatch(field, wanted, &other)),
    }
}

fn type_mismatch(field: &str, wanted: &str, got: &Value) -> EngineError {
    let kind = match got {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    };
    EngineError::validation(field, format!("expected {}, got {}", wanted, kind))
}
