//! State maps — the opaque normalized state carried by entities.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::EntityId;
use crate::time::Timestamp;

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(serde_json::Value),
}

impl AttributeValue {
    /// Numeric view of the value, when one exists.
    ///
    /// Telemetry persistence stores `None` as a NULL numeric column; the
    /// string form stays in the state map for callers that need it.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => {
                #[allow(clippy::cast_precision_loss)]
                Some(*i as f64)
            }
            Self::Float(f) => Some(*f),
            Self::String(s) => s.parse().ok(),
            Self::Json(v) => v.as_f64(),
        }
    }

    /// String view of the value, when it is a plain string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view of the value, when it is a plain bool.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// The opaque state mapping attached to entities and state updates.
pub type StateMap = HashMap<String, AttributeValue>;

/// Current normalized state snapshot of one entity.
///
/// Exactly one row per entity; upserts are last-write-wins and
/// `updated_at` never moves backwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: EntityId,
    pub state: StateMap,
    pub updated_at: Timestamp,
}

/// A live state sample delivered by a driver's subscription callback.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub entity_id: EntityId,
    pub state: StateMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_string_variant_as_plain_string() {
        let val = AttributeValue::String("hello".to_string());
        let json = serde_json::to_string(&val).unwrap();
        assert_eq!(json, "\"hello\"");
    }

    #[test]
    fn should_serialize_int_variant_as_number() {
        let val = AttributeValue::Int(42);
        let json = serde_json::to_string(&val).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn should_deserialize_json_object_as_json_variant() {
        let json = r#"{"nested": "value"}"#;
        let val: AttributeValue = serde_json::from_str(json).unwrap();
        assert!(matches!(val, AttributeValue::Json(_)));
    }

    #[test]
    fn should_coerce_numeric_values_to_f64() {
        assert_eq!(AttributeValue::Int(420).as_f64(), Some(420.0));
        assert_eq!(AttributeValue::Float(21.5).as_f64(), Some(21.5));
        assert_eq!(AttributeValue::Bool(true).as_f64(), Some(1.0));
        assert_eq!(AttributeValue::String("3.25".into()).as_f64(), Some(3.25));
    }

    #[test]
    fn should_not_coerce_non_numeric_strings() {
        assert_eq!(AttributeValue::String("open".into()).as_f64(), None);
    }

    #[test]
    fn should_roundtrip_state_map_through_serde_json() {
        let mut state = StateMap::new();
        state.insert("value".to_string(), AttributeValue::Float(420.0));
        state.insert("unit".to_string(), AttributeValue::String("ppm".into()));

        let json = serde_json::to_string(&state).unwrap();
        let parsed: StateMap = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.get("unit"), Some(&AttributeValue::String("ppm".into())));
    }
}
