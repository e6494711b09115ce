// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Value model and codec for polystore.
//
// The codec is the stateless converter between application values and
// the backend-safe byte strings drivers persist. Every driver receives
// a codec reference at initialization time and must round-trip values
// through it, so a value written under one driver decodes identically
// after a driver swap.
//
// # Wire format (JsonCodec)
//
// - Top-level text is stored as raw UTF-8.
// - Binary buffers are stored as `__psc__:blob:` followed by the raw
//   bytes, keeping decoded binary distinguishable from decoded text.
// - Everything else is stored as `__psc__:json:` followed by a
//   serde_json envelope of the tagged `Value` enum.
// - Text that itself begins with the marker is escaped under
//   `__psc__:text:`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Marker prefix for encodings that are not plain text.
const MARKER: &str = "__psc__:";
const CODE_JSON: &str = "json:";
const CODE_BLOB: &str = "blob:";
const CODE_TEXT: &str = "text:";

/// An application value as seen by the facade.
///
/// Missing keys and explicitly absent values both canonicalize to
/// [`Value::Null`]; `Option::None` converts to `Null` via `From`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Reject values the wire format cannot represent. Non-finite
    /// numbers have no JSON encoding and would otherwise decay to
    /// `Null` silently.
    fn validate_encodable(&self) -> Result<(), StoreError> {
        match self {
            Value::Number(n) if !n.is_finite() => Err(StoreError::Serialization(
                "cannot encode non-finite number".into(),
            )),
            Value::Array(items) => items.iter().try_for_each(Value::validate_encodable),
            Value::Map(entries) => entries.values().try_for_each(Value::validate_encodable),
            _ => Ok(()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Number(f64::from(v))
    }
}

// Numbers are stored as f64; integers beyond 2^53 lose precision.
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// Absent values canonicalize to `Null` before encoding.
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// Bidirectional converter between [`Value`]s and backend-safe bytes.
///
/// Implementations must be stateless with respect to individual calls:
/// `deserialize(serialize(v))` must reproduce `v` structurally,
/// including the text/binary category distinction.
pub trait Codec: Send + Sync {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, StoreError>;
    fn deserialize(&self, bytes: &[u8]) -> Result<Value, StoreError>;
}

/// The default codec: raw text, marker-prefixed binary, and a
/// serde_json envelope for structured values.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, StoreError> {
        value.validate_encodable()?;
        match value {
            Value::Text(s) if !s.starts_with(MARKER) => Ok(s.as_bytes().to_vec()),
            Value::Text(s) => {
                let mut out = format!("{MARKER}{CODE_TEXT}").into_bytes();
                out.extend_from_slice(s.as_bytes());
                Ok(out)
            }
            Value::Bytes(b) => {
                let mut out = format!("{MARKER}{CODE_BLOB}").into_bytes();
                out.extend_from_slice(b);
                Ok(out)
            }
            other => {
                let mut out = format!("{MARKER}{CODE_JSON}").into_bytes();
                let envelope = serde_json::to_vec(other)
                    .map_err(|err| StoreError::Serialization(err.to_string()))?;
                out.extend_from_slice(&envelope);
                Ok(out)
            }
        }
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, StoreError> {
        let Some(rest) = bytes.strip_prefix(MARKER.as_bytes()) else {
            let text = std::str::from_utf8(bytes).map_err(|err| {
                StoreError::Serialization(format!("stored text is not valid UTF-8: {err}"))
            })?;
            return Ok(Value::Text(text.to_string()));
        };

        if let Some(blob) = rest.strip_prefix(CODE_BLOB.as_bytes()) {
            return Ok(Value::Bytes(blob.to_vec()));
        }
        if let Some(text) = rest.strip_prefix(CODE_TEXT.as_bytes()) {
            let text = std::str::from_utf8(text).map_err(|err| {
                StoreError::Serialization(format!("stored text is not valid UTF-8: {err}"))
            })?;
            return Ok(Value::Text(text.to_string()));
        }
        if let Some(envelope) = rest.strip_prefix(CODE_JSON.as_bytes()) {
            return serde_json::from_slice(envelope)
                .map_err(|err| StoreError::Serialization(err.to_string()));
        }

        Err(StoreError::Serialization(
            "unknown encoding tag in stored value".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) -> Value {
        let codec = JsonCodec;
        let encoded = codec.serialize(&value).unwrap();
        codec.deserialize(&encoded).unwrap()
    }

    #[test]
    fn test_round_trip_primitives() {
        assert_eq!(round_trip(Value::Null), Value::Null);
        assert_eq!(round_trip(Value::Bool(true)), Value::Bool(true));
        assert_eq!(round_trip(Value::Number(42.5)), Value::Number(42.5));
        assert_eq!(
            round_trip(Value::Text("hello".into())),
            Value::Text("hello".into())
        );
    }

    #[test]
    fn test_round_trip_nested_composites() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Number(1.0));
        map.insert(
            "b".to_string(),
            Value::Array(vec![Value::Null, Value::Text("x".into())]),
        );
        let value = Value::Map(map);
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn test_bytes_stay_distinguishable_from_text() {
        let bytes = Value::Bytes(vec![0, 159, 146, 150]);
        let decoded = round_trip(bytes.clone());
        assert_eq!(decoded, bytes);
        assert!(decoded.as_bytes().is_some());
        assert!(decoded.as_text().is_none());
    }

    #[test]
    fn test_bytes_nested_inside_composites() {
        let value = Value::Array(vec![Value::Bytes(vec![1, 2, 3]), Value::Bool(false)]);
        assert_eq!(round_trip(value.clone()), value);
    }

    #[test]
    fn test_text_is_stored_raw() {
        let codec = JsonCodec;
        let encoded = codec.serialize(&Value::Text("plain".into())).unwrap();
        assert_eq!(encoded, b"plain".to_vec());
    }

    #[test]
    fn test_text_colliding_with_marker_round_trips() {
        let tricky = Value::Text("__psc__:blob:not really".into());
        assert_eq!(round_trip(tricky.clone()), tricky);
    }

    #[test]
    fn test_none_canonicalizes_to_null() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(round_trip(Value::from(None::<String>)), Value::Null);
    }

    #[test]
    fn test_non_finite_numbers_are_rejected() {
        let codec = JsonCodec;
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = codec.serialize(&Value::Number(bad)).unwrap_err();
            assert!(matches!(err, StoreError::Serialization(_)));
        }
        // Nested occurrences are caught too.
        let nested = Value::Array(vec![Value::Number(f64::NAN)]);
        assert!(codec.serialize(&nested).is_err());
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let codec = JsonCodec;
        let err = codec.deserialize(b"__psc__:zip:abc").unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
