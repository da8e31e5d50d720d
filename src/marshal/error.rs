//! Marshalling errors

use serde_json::Value;
use thiserror::Error;

/// Failure while converting between structured values and typed records.
///
/// Every variant names the field and record involved so a bad LLM response or
/// a corrupted evaluation log can be diagnosed without re-running anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    #[error("missing required field `{field}` in record `{record}`")]
    MissingField { field: String, record: String },

    #[error("field `{field}` in record `{record}`: expected {expected}, found {actual}")]
    TypeMismatch {
        field: String,
        record: String,
        expected: String,
        actual: String,
    },

    #[error("unsupported type for field `{field}` in record `{record}`: {reason}")]
    UnsupportedType {
        field: String,
        record: String,
        reason: String,
    },

    #[error("record `{record}` rejected at field `{field}`: {message}")]
    Validation {
        field: String,
        record: String,
        message: String,
    },
}

impl MarshalError {
    pub fn missing(record: &str, field: &str) -> Self {
        MarshalError::MissingField {
            field: field.to_string(),
            record: record.to_string(),
        }
    }

    pub fn mismatch(record: &str, field: &str, expected: &str, actual: &Value) -> Self {
        MarshalError::TypeMismatch {
            field: field.to_string(),
            record: record.to_string(),
            expected: expected.to_string(),
            actual: describe(actual),
        }
    }

    pub fn unsupported(record: &str, field: &str, reason: impl Into<String>) -> Self {
        MarshalError::UnsupportedType {
            field: field.to_string(),
            record: record.to_string(),
            reason: reason.into(),
        }
    }

    /// Name of the record the error was raised in.
    pub fn record(&self) -> &str {
        match self {
            MarshalError::MissingField { record, .. }
            | MarshalError::TypeMismatch { record, .. }
            | MarshalError::UnsupportedType { record, .. }
            | MarshalError::Validation { record, .. } => record,
        }
    }

    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            MarshalError::MissingField { field, .. }
            | MarshalError::TypeMismatch { field, .. }
            | MarshalError::UnsupportedType { field, .. }
            | MarshalError::Validation { field, .. } => field,
        }
    }
}

/// Short human description of a value's shape, used as the "actual" side of a
/// type mismatch.
pub(crate) fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean ({})", b),
        Value::Number(n) => format!("number ({})", n),
        Value::String(s) => {
            let preview: String = s.chars().take(40).collect();
            if preview.len() < s.len() {
                format!("string (\"{}...\")", preview)
            } else {
                format!("string (\"{}\")", preview)
            }
        }
        Value::Array(items) => format!("sequence of {} items", items.len()),
        Value::Object(map) => format!("mapping with {} keys", map.len()),
    }
}
