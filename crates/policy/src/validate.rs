//! Composable structural validators over untyped JSON.
//!
//! Every validator returns [`Validated<T>`]: either the typed value or a
//! [`ValidationError`] carrying a closed [`ValidationCode`], a path to the
//! offending field, and a human-readable message. Validators never panic
//! and never return partial results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Result of a structural validation step.
pub type Validated<T> = std::result::Result<T, ValidationError>;

/// Root path used for top-level documents.
pub const ROOT: &str = "$";

/// Closed set of structural validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationCode {
    NotARecord,
    UnknownKey,
    MissingField,
    InvalidVersion,
    DefaultNotDeny,
    EmptyKey,
    InvalidDecision,
    InvalidType,
    InvalidValue,
    Duplicate,
    ForbiddenField,
    PatternMismatch,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotARecord => "not-a-record",
            Self::UnknownKey => "unknown-key",
            Self::MissingField => "missing-field",
            Self::InvalidVersion => "invalid-version",
            Self::DefaultNotDeny => "default-not-deny",
            Self::EmptyKey => "empty-key",
            Self::InvalidDecision => "invalid-decision",
            Self::InvalidType => "invalid-type",
            Self::InvalidValue => "invalid-value",
            Self::Duplicate => "duplicate",
            Self::ForbiddenField => "forbidden-field",
            Self::PatternMismatch => "pattern-mismatch",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[{code}] {path}: {message}")]
pub struct ValidationError {
    pub code: ValidationCode,
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: ValidationCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Extend a path with a child key.
///
/// Identifier-like keys use dot notation (`$.roles.host`), anything else is
/// quoted (`$.surfaces["ui.visibility"]`) so paths stay unambiguous.
pub fn join(path: &str, key: &str) -> String {
    let plain = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if plain {
        format!("{path}.{key}")
    } else {
        format!("{path}[{key:?}]")
    }
}

/// Extend a path with an array index.
pub fn index(path: &str, i: usize) -> String {
    format!("{path}[{i}]")
}

/// Require a plain JSON object.
pub fn record<'a>(value: &'a Value, path: &str) -> Validated<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        ValidationError::new(
            ValidationCode::NotARecord,
            path,
            format!("expected a record, found {}", type_name(value)),
        )
    })
}

/// Require a JSON array.
pub fn list<'a>(value: &'a Value, path: &str) -> Validated<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| {
        ValidationError::new(
            ValidationCode::InvalidType,
            path,
            format!("expected a list, found {}", type_name(value)),
        )
    })
}

/// Reject any key outside `allowed`.
pub fn only_keys(map: &Map<String, Value>, allowed: &[&str], path: &str) -> Validated<()> {
    match map.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(ValidationError::new(
            ValidationCode::UnknownKey,
            join(path, key),
            format!("unknown key '{key}'"),
        )),
        None => Ok(()),
    }
}

/// Fetch a required field.
pub fn required<'a>(map: &'a Map<String, Value>, key: &str, path: &str) -> Validated<&'a Value> {
    map.get(key).ok_or_else(|| {
        ValidationError::new(
            ValidationCode::MissingField,
            join(path, key),
            format!("missing required field '{key}'"),
        )
    })
}

/// Fetch an optional field, treating `null` as absent.
pub fn optional<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

/// Require a string that is non-empty after trimming; returns the trimmed text.
pub fn non_empty_str<'a>(value: &'a Value, path: &str) -> Validated<&'a str> {
    let s = value.as_str().ok_or_else(|| {
        ValidationError::new(
            ValidationCode::InvalidType,
            path,
            format!("expected a string, found {}", type_name(value)),
        )
    })?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(
            ValidationCode::InvalidValue,
            path,
            "must not be empty",
        ));
    }
    Ok(trimmed)
}

/// Require a boolean.
pub fn boolean(value: &Value, path: &str) -> Validated<bool> {
    value.as_bool().ok_or_else(|| {
        ValidationError::new(
            ValidationCode::InvalidType,
            path,
            format!("expected a boolean, found {}", type_name(value)),
        )
    })
}

/// Require a finite integer strictly greater than zero.
pub fn positive_integer(value: &Value, path: &str) -> Validated<u64> {
    match value.as_u64() {
        Some(n) if n > 0 => Ok(n),
        _ => Err(ValidationError::new(
            ValidationCode::InvalidValue,
            path,
            format!("expected a positive integer, found {value}"),
        )),
    }
}

/// Require a map key that is non-empty after trimming.
pub fn non_empty_key(key: &str, path: &str) -> Validated<()> {
    if key.trim().is_empty() {
        return Err(ValidationError::new(
            ValidationCode::EmptyKey,
            path,
            "keys must not be empty",
        ));
    }
    Ok(())
}

/// Deserialize a closed-set string value (an enum with `serde(rename_all)`).
pub fn one_of<T>(value: &Value, path: &str, expected: &str) -> Validated<T>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(value.clone()).map_err(|_| {
        ValidationError::new(
            ValidationCode::InvalidValue,
            path,
            format!("expected one of {expected}, found {value}"),
        )
    })
}

/// Identifier pattern shared by modules, plugins and templates:
/// `[a-z0-9][a-z0-9._-]{0,63}`.
pub fn is_identifier(id: &str) -> bool {
    let mut chars = id.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    id.len() <= 64
        && (first.is_ascii_lowercase() || first.is_ascii_digit())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

/// Require `id` to match [`is_identifier`].
pub fn identifier(id: &str, path: &str) -> Validated<()> {
    if is_identifier(id) {
        Ok(())
    } else {
        Err(ValidationError::new(
            ValidationCode::PatternMismatch,
            path,
            format!("'{id}' must match [a-z0-9][a-z0-9._-]{{0,63}}"),
        ))
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "record",
    }
}
