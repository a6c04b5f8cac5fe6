use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Generic runtime value type for query results and cached field data.
///
/// Supports all JSON-compatible types. Used as the concrete value type for
/// raw query results handed to [`CacheStore::write`](crate::store::CacheStore::write)
/// and for the hierarchical results rebuilt by reads.
///
/// Serializes untagged, so the JSON form is plain JSON (`5`, `"x"`,
/// `{"a": 1}`), not variant-wrapped. `BTreeMap` keeps object key order
/// deterministic across serializations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point (64-bit IEEE 754).
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
    /// JSON array (ordered sequence of values).
    Array(Vec<Value>),
    /// JSON object (ordered map of string keys to values).
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the contained string, or `None` for any other variant.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the contained object map, or `None` for any other variant.
    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a field on an object value. `None` for non-objects.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(field))
    }

    /// Returns `true` for `Value::Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Int(i) => Self::Number(i.into()),
            Value::Float(f) => serde_json::Number::from_f64(f).map_or(Self::Null, Self::Number),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_untagged() {
        let value = Value::Object(BTreeMap::from([
            ("id".to_string(), Value::Int(1)),
            ("name".to_string(), Value::String("Ada".to_string())),
        ]));
        let json = serde_json::to_string(&value).expect("serialize");
        assert_eq!(json, r#"{"id":1,"name":"Ada"}"#);
    }

    #[test]
    fn deserializes_integers_as_int() {
        let value: Value = serde_json::from_str("7").expect("deserialize");
        assert_eq!(value, Value::Int(7));

        let value: Value = serde_json::from_str("7.5").expect("deserialize");
        assert_eq!(value, Value::Float(7.5));
    }

    #[test]
    fn json_round_trip_via_from() {
        let json = serde_json::json!({
            "user": { "id": "1", "tags": ["a", "b"], "score": 2.5, "active": true }
        });
        let value = Value::from(json.clone());
        assert_eq!(serde_json::Value::from(value), json);
    }

    #[test]
    fn get_walks_object_fields() {
        let value = Value::from(serde_json::json!({ "a": { "b": 3 } }));
        assert_eq!(value.get("a").and_then(|v| v.get("b")), Some(&Value::Int(3)));
        assert_eq!(value.get("missing"), None);
        assert_eq!(Value::Int(1).get("a"), None);
    }
}
