/*!
Application metadata attached to stored objects.

Metadata is a flat mapping from string keys to scalar values. Nested values
are rejected up front with [`StoreError::UnsupportedValueType`] rather than
being stringified or dropped.
*/

use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata mapping carried alongside an object's content.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A single metadata value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl MetaValue {
    /// Returns the string value, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Short name of the value's type, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            MetaValue::Null => "null",
            MetaValue::Bool(_) => "boolean",
            MetaValue::Number(_) => "number",
            MetaValue::String(_) => "string",
        }
    }

    /// Convert a loosely typed JSON value, naming `key` in the error if it is not a scalar.
    pub fn from_json(key: &str, value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(MetaValue::Null),
            Value::Bool(b) => Ok(MetaValue::Bool(b)),
            Value::Number(n) => Ok(MetaValue::Number(n)),
            Value::String(s) => Ok(MetaValue::String(s)),
            Value::Array(_) => Err(StoreError::unsupported_value(key, "array")),
            Value::Object(_) => Err(StoreError::unsupported_value(key, "object")),
        }
    }
}

impl TryFrom<Value> for MetaValue {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self> {
        MetaValue::from_json("<value>", value)
    }
}

impl From<MetaValue> for Value {
    fn from(value: MetaValue) -> Self {
        match value {
            MetaValue::Null => Value::Null,
            MetaValue::Bool(b) => Value::Bool(b),
            MetaValue::Number(n) => Value::Number(n),
            MetaValue::String(s) => Value::String(s),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::String(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::String(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Number(value.into())
    }
}

impl From<u64> for MetaValue {
    fn from(value: u64) -> Self {
        MetaValue::Number(value.into())
    }
}

impl<T: Into<MetaValue>> From<Option<T>> for MetaValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(MetaValue::Null, Into::into)
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Null => f.write_str("null"),
            MetaValue::Bool(b) => write!(f, "{b}"),
            MetaValue::Number(n) => write!(f, "{n}"),
            MetaValue::String(s) => f.write_str(s),
        }
    }
}

/// Build a [`Metadata`] mapping from a JSON object.
///
/// # Example
/// ```rust
/// use bucketstore_core::metadata::{metadata_from_json, MetaValue};
///
/// let meta = metadata_from_json(serde_json::json!({"name": "a.png", "width": 40})).unwrap();
/// assert_eq!(meta["name"], MetaValue::from("a.png"));
///
/// assert!(metadata_from_json(serde_json::json!({"tags": ["x"]})).is_err());
/// ```
pub fn metadata_from_json(value: Value) -> Result<Metadata> {
    match value {
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| {
                let value = MetaValue::from_json(&key, value)?;
                Ok((key, value))
            })
            .collect(),
        other => Err(StoreError::validation(format!(
            "metadata must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
