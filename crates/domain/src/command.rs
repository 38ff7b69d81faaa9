//! Commands — normalized requests flowing from callers to drivers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::id::EntityId;
use crate::state::{AttributeValue, StateMap};

/// A normalized command aimed at one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub entity_id: EntityId,
    /// Capability being driven (e.g. `"on_off"`, `"brightness"`).
    pub capability: String,
    pub value: AttributeValue,
    #[serde(default)]
    pub metadata: StateMap,
}

impl CommandRequest {
    #[must_use]
    pub fn new(
        entity_id: impl Into<EntityId>,
        capability: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            capability: capability.into(),
            value: value.into(),
            metadata: StateMap::new(),
        }
    }
}

/// Driver-level result of a single `invoke`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvokeResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl InvokeResult {
    #[must_use]
    pub fn success() -> Self {
        Self {
            ok: true,
            error: None,
            data: None,
        }
    }

    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            data: None,
        }
    }
}

/// What the command router hands back to its caller: the aggregated result
/// of rate-limiting, coalescing and driver retries, plus the wall-clock
/// latency measured from entry into `process_command`.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub data: Option<serde_json::Value>,
    pub latency: Option<Duration>,
}

impl CommandOutcome {
    #[must_use]
    pub fn success(latency: Duration) -> Self {
        Self {
            success: true,
            error: None,
            data: None,
            latency: Some(latency),
        }
    }

    #[must_use]
    pub fn failure(error: impl Into<String>, latency: Duration) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: None,
            latency: Some(latency),
        }
    }

    /// Outcome for a coalesced request that was superseded before reaching
    /// the driver. The caller sees success; no latency is reported because
    /// no dispatch happened.
    #[must_use]
    pub fn superseded() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
            latency: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_command_request_from_parts() {
        let req = CommandRequest::new("e1", "brightness", 80.0);
        assert_eq!(req.entity_id.as_str(), "e1");
        assert_eq!(req.capability, "brightness");
        assert_eq!(req.value, AttributeValue::Float(80.0));
    }

    #[test]
    fn should_skip_absent_fields_when_serializing_invoke_result() {
        let json = serde_json::to_string(&InvokeResult::success()).unwrap();
        assert_eq!(json, r#"{"ok":true}"#);

        let json = serde_json::to_string(&InvokeResult::failure("Unsupported capability")).unwrap();
        assert_eq!(json, r#"{"ok":false,"error":"Unsupported capability"}"#);
    }

    #[test]
    fn should_mark_superseded_outcome_successful_without_latency() {
        let outcome = CommandOutcome::superseded();
        assert!(outcome.success);
        assert!(outcome.latency.is_none());
    }
}
