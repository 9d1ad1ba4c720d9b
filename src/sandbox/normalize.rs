//! Result normalization
//!
//! Runtime output is raw bytes. Before a result crosses the HTTP boundary
//! every byte string in it is decoded to text, recursively through lists and
//! maps. Undecodable byte sequences are dropped.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// A result tree that may still contain raw bytes
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
}

impl RawValue {
    /// Decode every byte string in the tree. Idempotent.
    pub fn normalize(self) -> RawValue {
        match self {
            RawValue::Bytes(bytes) => RawValue::Text(decode_lossy(&bytes)),
            RawValue::List(items) => {
                RawValue::List(items.into_iter().map(RawValue::normalize).collect())
            }
            RawValue::Map(entries) => RawValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.normalize()))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Whether the tree contains no byte strings
    pub fn is_normalized(&self) -> bool {
        match self {
            RawValue::Bytes(_) => false,
            RawValue::List(items) => items.iter().all(RawValue::is_normalized),
            RawValue::Map(entries) => entries.values().all(RawValue::is_normalized),
            _ => true,
        }
    }

    /// Convert to JSON, normalizing on the way
    pub fn into_json(self) -> Value {
        match self.normalize() {
            RawValue::Null => Value::Null,
            RawValue::Bool(b) => Value::Bool(b),
            RawValue::Int(i) => Value::Number(i.into()),
            RawValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
            RawValue::Text(s) => Value::String(s),
            // normalize() leaves no bytes behind
            RawValue::Bytes(bytes) => Value::String(decode_lossy(&bytes)),
            RawValue::List(items) => Value::Array(items.into_iter().map(RawValue::into_json).collect()),
            RawValue::Map(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.into_json()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

/// Normalize a result tree
pub fn normalize(value: RawValue) -> RawValue {
    value.normalize()
}

/// Decode UTF-8, silently dropping invalid byte sequences
pub fn decode_lossy(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                // A truncated sequence at the end has no error length
                let skip = e.error_len().unwrap_or(rest.len());
                bytes = &rest[skip..];
            }
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<Vec<u8>> for RawValue {
    fn from(bytes: Vec<u8>) -> Self {
        RawValue::Bytes(bytes)
    }
}

impl From<bool> for RawValue {
    fn from(b: bool) -> Self {
        RawValue::Bool(b)
    }
}

impl From<i64> for RawValue {
    fn from(i: i64) -> Self {
        RawValue::Int(i)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(RawValue::Null)
    }
}
