//! Bus events — what flows over the in-process event bus.
//!
//! Topics are plain strings with a small, fixed vocabulary:
//! `entity/{id}/state`, `device/{id}/lifecycle`, `telemetry`,
//! `command/{id}`, and `error`. Subscribers match on exact topic strings or
//! single-segment `*` wildcards.

use serde::{Deserialize, Serialize};

use crate::id::{DeviceId, EntityId};
use crate::state::StateMap;
use crate::time::Timestamp;

/// Topic constructors for the bus vocabulary.
pub mod topics {
    use crate::id::{DeviceId, EntityId};

    pub const TELEMETRY: &str = "telemetry";
    pub const ERROR: &str = "error";

    /// `entity/{id}/state`
    #[must_use]
    pub fn entity_state(entity_id: &EntityId) -> String {
        format!("entity/{entity_id}/state")
    }

    /// Wildcard matching every entity's state topic.
    pub const ENTITY_STATE_WILDCARD: &str = "entity/*/state";

    /// `device/{id}/lifecycle`
    #[must_use]
    pub fn device_lifecycle(device_id: &DeviceId) -> String {
        format!("device/{device_id}/lifecycle")
    }

    /// Wildcard matching every device's lifecycle topic.
    pub const DEVICE_LIFECYCLE_WILDCARD: &str = "device/*/lifecycle";

    /// `command/{id}`
    #[must_use]
    pub fn command(entity_id: &EntityId) -> String {
        format!("command/{entity_id}")
    }
}

/// Device lifecycle transitions published on `device/{id}/lifecycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Discovered,
    Paired,
    Unpaired,
    Connected,
    Disconnected,
    EntitiesComplete,
    Error,
}

impl LifecycleEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Paired => "paired",
            Self::Unpaired => "unpaired",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::EntitiesComplete => "entities_complete",
            Self::Error => "error",
        }
    }
}

/// Typed payloads for the topic vocabulary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    EntityState {
        entity_id: EntityId,
        state: StateMap,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous: Option<StateMap>,
    },
    DeviceLifecycle {
        device_id: DeviceId,
        event: LifecycleEvent,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
    Telemetry {
        entity_id: EntityId,
        field: String,
        value: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
    },
    Command {
        entity_id: EntityId,
        command: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        latency_ms: Option<u64>,
    },
    Error {
        source: String,
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
    },
}

/// One message on the bus: a topic string plus its typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub topic: String,
    pub payload: EventPayload,
    pub ts: Timestamp,
}

impl BusEvent {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            topic: topic.into(),
            payload,
            ts: crate::time::now(),
        }
    }

    /// `entity/{id}/state` event.
    #[must_use]
    pub fn entity_state(entity_id: EntityId, state: StateMap, previous: Option<StateMap>) -> Self {
        Self::new(
            topics::entity_state(&entity_id),
            EventPayload::EntityState {
                entity_id,
                state,
                previous,
            },
        )
    }

    /// `device/{id}/lifecycle` event.
    #[must_use]
    pub fn device_lifecycle(
        device_id: DeviceId,
        event: LifecycleEvent,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self::new(
            topics::device_lifecycle(&device_id),
            EventPayload::DeviceLifecycle {
                device_id,
                event,
                details,
            },
        )
    }

    /// `telemetry` event.
    #[must_use]
    pub fn telemetry(
        entity_id: EntityId,
        field: impl Into<String>,
        value: Option<f64>,
        unit: Option<String>,
    ) -> Self {
        Self::new(
            topics::TELEMETRY,
            EventPayload::Telemetry {
                entity_id,
                field: field.into(),
                value,
                unit,
            },
        )
    }

    /// `command/{id}` event.
    #[must_use]
    pub fn command(
        entity_id: EntityId,
        command: impl Into<String>,
        success: bool,
        latency_ms: Option<u64>,
    ) -> Self {
        Self::new(
            topics::command(&entity_id),
            EventPayload::Command {
                entity_id,
                command: command.into(),
                success,
                latency_ms,
            },
        )
    }

    /// `error` event.
    #[must_use]
    pub fn error(
        source: impl Into<String>,
        error: impl Into<String>,
        context: Option<serde_json::Value>,
    ) -> Self {
        Self::new(
            topics::ERROR,
            EventPayload::Error {
                source: source.into(),
                error: error.into(),
                context,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_entity_state_topic_from_id() {
        let event = BusEvent::entity_state(EntityId::new("e1"), StateMap::new(), None);
        assert_eq!(event.topic, "entity/e1/state");
    }

    #[test]
    fn should_build_lifecycle_topic_from_device_id() {
        let event =
            BusEvent::device_lifecycle(DeviceId::new("d1"), LifecycleEvent::Paired, None);
        assert_eq!(event.topic, "device/d1/lifecycle");
        assert!(matches!(
            event.payload,
            EventPayload::DeviceLifecycle {
                event: LifecycleEvent::Paired,
                ..
            }
        ));
    }

    #[test]
    fn should_put_telemetry_on_the_shared_topic() {
        let event = BusEvent::telemetry(EntityId::new("e1"), "co2", Some(420.0), None);
        assert_eq!(event.topic, "telemetry");
    }

    #[test]
    fn should_serialize_lifecycle_event_as_snake_case() {
        let json = serde_json::to_string(&LifecycleEvent::EntitiesComplete).unwrap();
        assert_eq!(json, "\"entities_complete\"");
    }

    #[test]
    fn should_roundtrip_event_through_serde_json() {
        let event = BusEvent::command(EntityId::new("e1"), "on_off", true, Some(42));
        let json = serde_json::to_string(&event).unwrap();
        let parsed: BusEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.topic, "command/e1");
        assert!(matches!(
            parsed.payload,
            EventPayload::Command { success: true, .. }
        ));
    }
}
