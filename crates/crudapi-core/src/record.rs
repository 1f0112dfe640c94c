//! Field access over opaque records.
//!
//! Records coming out of a data layer are treated as key/value bags; the
//! serializer and hooks never assume a concrete shape beyond that.

use serde_json::{Map, Value};

/// A record as stored and returned by a data layer.
pub type RecordMap = Map<String, Value>;

pub trait Record {
    fn field(&self, key: &str) -> Option<&Value>;

    fn has_field(&self, key: &str) -> bool {
        self.field(key).is_some()
    }
}

impl Record for Map<String, Value> {
    fn field(&self, key: &str) -> Option<&Value> {
        self.get(key)
    }
}

impl Record for Value {
    fn field(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }
}

/// Render an id value as the string form used on the wire.
///
/// Only strings and numbers are valid ids.
pub fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
