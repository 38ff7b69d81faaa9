//! Entity enumeration and state normalization.
//!
//! Every `ListEntities*Response` becomes an [`EspHomeEntity`] keyed by the
//! driver-assigned 32-bit key; state responses are normalized into the
//! hub's per-kind state shapes before they reach subscriber callbacks.

use hearth_domain::entity::{Capability, EntityDescriptor, EntityKind};
use hearth_domain::id::{DeviceId, EntityId};
use hearth_domain::state::{AttributeValue, StateMap};

use crate::frame::Frame;
use crate::proto;
use crate::wire::WireError;

/// One entity as the device reports it.
#[derive(Debug, Clone)]
pub struct EspHomeEntity {
    /// Driver-assigned 32-bit key correlating state updates.
    pub key: u32,
    pub object_id: String,
    pub name: String,
    pub kind: EntityKind,
    /// Unit of measurement, for sensors that declare one.
    pub unit: Option<String>,
    pub capability: Capability,
}

impl EspHomeEntity {
    /// Hub-wide entity id: `"{device_id}:{object_id}"`.
    #[must_use]
    pub fn entity_id(&self, device_id: &DeviceId) -> EntityId {
        EntityId::new(format!("{device_id}:{}", self.object_id))
    }

    /// Registry descriptor for this entity. The stable key metadata is the
    /// device-assigned numeric key, so renames keep identity.
    #[must_use]
    pub fn descriptor(&self, device_id: &DeviceId) -> EntityDescriptor {
        let mut descriptor =
            EntityDescriptor::new(self.entity_id(device_id), self.name.clone(), self.kind);
        descriptor.capability = self.capability.clone();
        descriptor.metadata.insert(
            "key".to_string(),
            AttributeValue::String(self.key.to_string()),
        );
        descriptor
    }
}

fn base_entity(
    key: u32,
    object_id: String,
    name: String,
    kind: EntityKind,
) -> EspHomeEntity {
    let name = if name.is_empty() {
        object_id.clone()
    } else {
        name
    };
    EspHomeEntity {
        key,
        object_id,
        name,
        kind,
        unit: None,
        capability: Capability::new(kind.as_str()),
    }
}

/// Decode a `ListEntities*Response` frame into an entity.
///
/// Returns `Ok(None)` when the frame is not an entity enumeration message.
///
/// # Errors
///
/// Returns [`WireError`] on a malformed payload.
#[allow(clippy::too_many_lines)]
pub fn entity_from_frame(frame: &Frame) -> Result<Option<EspHomeEntity>, WireError> {
    let entity = match frame.msg_type {
        proto::ListEntitiesBinarySensorResponse::TYPE => {
            let msg = proto::ListEntitiesBinarySensorResponse::decode(&frame.payload)?;
            let mut entity =
                base_entity(msg.key, msg.object_id, msg.name, EntityKind::BinarySensor);
            if !msg.device_class.is_empty() {
                entity.capability = entity
                    .capability
                    .with_attribute("device_class", msg.device_class);
            }
            entity
        }
        proto::ListEntitiesCoverResponse::TYPE => {
            let msg = proto::ListEntitiesCoverResponse::decode(&frame.payload)?;
            let mut entity = base_entity(msg.key, msg.object_id, msg.name, EntityKind::Cover);
            entity.capability = entity
                .capability
                .with_attribute("supports_position", msg.supports_position);
            entity
        }
        proto::ListEntitiesFanResponse::TYPE => {
            let msg = proto::ListEntitiesFanResponse::decode(&frame.payload)?;
            let mut entity = base_entity(msg.key, msg.object_id, msg.name, EntityKind::Fan);
            if msg.supports_speed {
                entity.capability = entity
                    .capability
                    .with_attribute("speed_count", i64::from(msg.supported_speed_count));
            }
            entity
        }
        proto::ListEntitiesLightResponse::TYPE => {
            let msg = proto::ListEntitiesLightResponse::decode(&frame.payload)?;
            let mut entity = base_entity(msg.key, msg.object_id, msg.name, EntityKind::Light);
            entity.capability = entity
                .capability
                .with_attribute("supports_brightness", msg.legacy_supports_brightness)
                .with_attribute("supports_rgb", msg.legacy_supports_rgb);
            entity
        }
        proto::ListEntitiesSensorResponse::TYPE => {
            let msg = proto::ListEntitiesSensorResponse::decode(&frame.payload)?;
            let mut entity = base_entity(msg.key, msg.object_id, msg.name, EntityKind::Sensor);
            if !msg.unit_of_measurement.is_empty() {
                entity.capability = entity
                    .capability
                    .with_attribute("unit", msg.unit_of_measurement.as_str());
                entity.unit = Some(msg.unit_of_measurement);
            }
            entity
        }
        proto::ListEntitiesSwitchResponse::TYPE => {
            let msg = proto::ListEntitiesSwitchResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Switch)
        }
        proto::ListEntitiesTextSensorResponse::TYPE => {
            let msg = proto::ListEntitiesTextSensorResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Sensor)
        }
        proto::ListEntitiesCameraResponse::TYPE => {
            let msg = proto::ListEntitiesCameraResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Image)
        }
        proto::ListEntitiesClimateResponse::TYPE => {
            let msg = proto::ListEntitiesClimateResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Climate)
        }
        proto::ListEntitiesNumberResponse::TYPE => {
            let msg = proto::ListEntitiesNumberResponse::decode(&frame.payload)?;
            let mut entity = base_entity(msg.key, msg.object_id, msg.name, EntityKind::Number);
            entity.capability = entity
                .capability
                .with_attribute("min", f64::from(msg.min_value))
                .with_attribute("max", f64::from(msg.max_value))
                .with_attribute("step", f64::from(msg.step));
            entity
        }
        proto::ListEntitiesSelectResponse::TYPE => {
            let msg = proto::ListEntitiesSelectResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Select)
        }
        proto::ListEntitiesSirenResponse::TYPE => {
            let msg = proto::ListEntitiesSirenResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Alarm)
        }
        proto::ListEntitiesLockResponse::TYPE => {
            let msg = proto::ListEntitiesLockResponse::decode(&frame.payload)?;
            let mut entity = base_entity(msg.key, msg.object_id, msg.name, EntityKind::Lock);
            entity.capability = entity
                .capability
                .with_attribute("supports_open", msg.supports_open);
            entity
        }
        proto::ListEntitiesButtonResponse::TYPE => {
            let msg = proto::ListEntitiesButtonResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Button)
        }
        proto::ListEntitiesMediaPlayerResponse::TYPE => {
            let msg = proto::ListEntitiesMediaPlayerResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::MediaPlayer)
        }
        proto::ListEntitiesAlarmControlPanelResponse::TYPE => {
            let msg = proto::ListEntitiesAlarmControlPanelResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Alarm)
        }
        proto::ListEntitiesTextResponse::TYPE => {
            let msg = proto::ListEntitiesTextResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Text)
        }
        proto::ListEntitiesDateResponse::TYPE => {
            let msg = proto::ListEntitiesDateResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Date)
        }
        proto::ListEntitiesTimeResponse::TYPE | proto::ListEntitiesDateTimeResponse::TYPE => {
            // DateTime entities share the time surface.
            let msg = proto::ListEntitiesTimeResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Time)
        }
        proto::ListEntitiesEventResponse::TYPE => {
            let msg = proto::ListEntitiesEventResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Sensor)
        }
        proto::ListEntitiesValveResponse::TYPE => {
            let msg = proto::ListEntitiesValveResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Cover)
        }
        proto::ListEntitiesUpdateResponse::TYPE => {
            let msg = proto::ListEntitiesUpdateResponse::decode(&frame.payload)?;
            base_entity(msg.key, msg.object_id, msg.name, EntityKind::Update)
        }
        _ => return Ok(None),
    };
    Ok(Some(entity))
}

fn float_state(value: f32) -> AttributeValue {
    AttributeValue::Float(f64::from(value))
}

const LOCK_STATES: [&str; 6] = [
    "none",
    "locked",
    "unlocked",
    "jammed",
    "locking",
    "unlocking",
];

const MEDIA_PLAYER_STATES: [&str; 4] = ["none", "idle", "playing", "paused"];

fn enum_state(table: &[&str], value: u32) -> AttributeValue {
    let name = table.get(value as usize).copied().unwrap_or("unknown");
    AttributeValue::String(name.to_string())
}

/// Decode a `*StateResponse` frame into `(key, normalized state)`.
///
/// Returns `Ok(None)` when the frame is not a state message or the device
/// flagged the state as missing.
///
/// # Errors
///
/// Returns [`WireError`] on a malformed payload.
#[allow(clippy::too_many_lines)]
pub fn state_from_frame(frame: &Frame) -> Result<Option<(u32, StateMap)>, WireError> {
    let mut state = StateMap::new();
    let key = match frame.msg_type {
        proto::BinarySensorStateResponse::TYPE => {
            let msg = proto::BinarySensorStateResponse::decode(&frame.payload)?;
            if msg.missing_state {
                return Ok(None);
            }
            state.insert("state".into(), AttributeValue::Bool(msg.state));
            msg.key
        }
        proto::CoverStateResponse::TYPE => {
            let msg = proto::CoverStateResponse::decode(&frame.payload)?;
            let open = msg.legacy_state == 0;
            state.insert(
                "state".into(),
                AttributeValue::String(if open { "open" } else { "closed" }.to_string()),
            );
            state.insert("position".into(), float_state(msg.position * 100.0));
            msg.key
        }
        proto::FanStateResponse::TYPE => {
            let msg = proto::FanStateResponse::decode(&frame.payload)?;
            state.insert("state".into(), AttributeValue::Bool(msg.state));
            state.insert("speed".into(), AttributeValue::Int(i64::from(msg.speed_level)));
            msg.key
        }
        proto::LightStateResponse::TYPE => {
            let msg = proto::LightStateResponse::decode(&frame.payload)?;
            state.insert("state".into(), AttributeValue::Bool(msg.state));
            state.insert(
                "brightness".into(),
                float_state((msg.brightness * 100.0).round()),
            );
            state.insert(
                "color".into(),
                AttributeValue::Json(serde_json::json!({
                    "r": (msg.red * 255.0).round(),
                    "g": (msg.green * 255.0).round(),
                    "b": (msg.blue * 255.0).round(),
                })),
            );
            msg.key
        }
        proto::SensorStateResponse::TYPE => {
            let msg = proto::SensorStateResponse::decode(&frame.payload)?;
            if msg.missing_state {
                return Ok(None);
            }
            state.insert("value".into(), float_state(msg.state));
            msg.key
        }
        proto::SwitchStateResponse::TYPE => {
            let msg = proto::SwitchStateResponse::decode(&frame.payload)?;
            state.insert("state".into(), AttributeValue::Bool(msg.state));
            msg.key
        }
        proto::TextSensorStateResponse::TYPE => {
            let msg = proto::TextSensorStateResponse::decode(&frame.payload)?;
            if msg.missing_state {
                return Ok(None);
            }
            state.insert("value".into(), AttributeValue::String(msg.state));
            msg.key
        }
        proto::ClimateStateResponse::TYPE => {
            let msg = proto::ClimateStateResponse::decode(&frame.payload)?;
            state.insert("mode".into(), AttributeValue::Int(i64::from(msg.mode)));
            state.insert(
                "current_temperature".into(),
                float_state(msg.current_temperature),
            );
            state.insert(
                "target_temperature".into(),
                float_state(msg.target_temperature),
            );
            msg.key
        }
        proto::NumberStateResponse::TYPE => {
            let msg = proto::NumberStateResponse::decode(&frame.payload)?;
            if msg.missing_state {
                return Ok(None);
            }
            state.insert("value".into(), float_state(msg.state));
            msg.key
        }
        proto::SelectStateResponse::TYPE => {
            let msg = proto::SelectStateResponse::decode(&frame.payload)?;
            if msg.missing_state {
                return Ok(None);
            }
            state.insert("value".into(), AttributeValue::String(msg.state));
            msg.key
        }
        proto::SirenStateResponse::TYPE => {
            let msg = proto::SirenStateResponse::decode(&frame.payload)?;
            state.insert("state".into(), AttributeValue::Bool(msg.state));
            msg.key
        }
        proto::LockStateResponse::TYPE => {
            let msg = proto::LockStateResponse::decode(&frame.payload)?;
            state.insert("state".into(), enum_state(&LOCK_STATES, msg.state));
            msg.key
        }
        proto::MediaPlayerStateResponse::TYPE => {
            let msg = proto::MediaPlayerStateResponse::decode(&frame.payload)?;
            state.insert("state".into(), enum_state(&MEDIA_PLAYER_STATES, msg.state));
            state.insert("volume".into(), float_state(msg.volume));
            state.insert("muted".into(), AttributeValue::Bool(msg.muted));
            msg.key
        }
        proto::AlarmControlPanelStateResponse::TYPE => {
            let msg = proto::AlarmControlPanelStateResponse::decode(&frame.payload)?;
            state.insert("state".into(), AttributeValue::Int(i64::from(msg.state)));
            msg.key
        }
        proto::TextStateResponse::TYPE => {
            let msg = proto::TextStateResponse::decode(&frame.payload)?;
            if msg.missing_state {
                return Ok(None);
            }
            state.insert("value".into(), AttributeValue::String(msg.state));
            msg.key
        }
        proto::DateStateResponse::TYPE => {
            let msg = proto::DateStateResponse::decode(&frame.payload)?;
            if msg.missing_state {
                return Ok(None);
            }
            state.insert(
                "value".into(),
                AttributeValue::String(format!(
                    "{:04}-{:02}-{:02}",
                    msg.year, msg.month, msg.day
                )),
            );
            msg.key
        }
        proto::TimeStateResponse::TYPE => {
            let msg = proto::TimeStateResponse::decode(&frame.payload)?;
            if msg.missing_state {
                return Ok(None);
            }
            state.insert(
                "value".into(),
                AttributeValue::String(format!(
                    "{:02}:{:02}:{:02}",
                    msg.hour, msg.minute, msg.second
                )),
            );
            msg.key
        }
        proto::EventResponse::TYPE => {
            let msg = proto::EventResponse::decode(&frame.payload)?;
            state.insert("value".into(), AttributeValue::String(msg.event_type));
            msg.key
        }
        proto::ValveStateResponse::TYPE => {
            let msg = proto::ValveStateResponse::decode(&frame.payload)?;
            state.insert("position".into(), float_state(msg.position * 100.0));
            msg.key
        }
        proto::DateTimeStateResponse::TYPE => {
            let msg = proto::DateTimeStateResponse::decode(&frame.payload)?;
            if msg.missing_state {
                return Ok(None);
            }
            state.insert(
                "value".into(),
                AttributeValue::Int(i64::from(msg.epoch_seconds)),
            );
            msg.key
        }
        proto::UpdateStateResponse::TYPE => {
            let msg = proto::UpdateStateResponse::decode(&frame.payload)?;
            state.insert("in_progress".into(), AttributeValue::Bool(msg.in_progress));
            state.insert(
                "current_version".into(),
                AttributeValue::String(msg.current_version),
            );
            state.insert(
                "latest_version".into(),
                AttributeValue::String(msg.latest_version),
            );
            msg.key
        }
        _ => return Ok(None),
    };

    Ok(Some((key, state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{
        LightStateResponse, ListEntitiesLightResponse, ListEntitiesSensorResponse,
        SensorStateResponse,
    };

    fn frame_of(msg_type: u32, payload: Vec<u8>) -> Frame {
        Frame::new(msg_type, payload)
    }

    #[test]
    fn should_build_entity_from_sensor_listing() {
        let msg = ListEntitiesSensorResponse {
            object_id: "co2".to_string(),
            key: 42,
            name: "CO2 Reading".to_string(),
            unit_of_measurement: "ppm".to_string(),
            ..ListEntitiesSensorResponse::default()
        };
        let frame = frame_of(ListEntitiesSensorResponse::TYPE, msg.encode());

        let entity = entity_from_frame(&frame).unwrap().unwrap();
        assert_eq!(entity.key, 42);
        assert_eq!(entity.kind, EntityKind::Sensor);
        assert_eq!(entity.unit.as_deref(), Some("ppm"));

        let device_id = DeviceId::new("esphome-office");
        assert_eq!(
            entity.entity_id(&device_id).as_str(),
            "esphome-office:co2"
        );

        let descriptor = entity.descriptor(&device_id);
        assert_eq!(descriptor.key(), "42");
        assert_eq!(descriptor.name, "CO2 Reading");
    }

    #[test]
    fn should_fall_back_to_object_id_when_name_is_empty() {
        let msg = ListEntitiesSensorResponse {
            object_id: "co2".to_string(),
            key: 1,
            ..ListEntitiesSensorResponse::default()
        };
        let frame = frame_of(ListEntitiesSensorResponse::TYPE, msg.encode());
        let entity = entity_from_frame(&frame).unwrap().unwrap();
        assert_eq!(entity.name, "co2");
    }

    #[test]
    fn should_ignore_non_listing_frames() {
        let frame = frame_of(SensorStateResponse::TYPE, Vec::new());
        assert!(entity_from_frame(&frame).unwrap().is_none());
    }

    #[test]
    fn should_normalize_sensor_state() {
        let msg = SensorStateResponse {
            key: 42,
            state: 420.0,
            missing_state: false,
        };
        let frame = frame_of(SensorStateResponse::TYPE, msg.encode());

        let (key, state) = state_from_frame(&frame).unwrap().unwrap();
        assert_eq!(key, 42);
        assert_eq!(state.get("value"), Some(&AttributeValue::Float(420.0)));
    }

    #[test]
    fn should_drop_missing_sensor_state() {
        let msg = SensorStateResponse {
            key: 42,
            state: 0.0,
            missing_state: true,
        };
        let frame = frame_of(SensorStateResponse::TYPE, msg.encode());
        assert!(state_from_frame(&frame).unwrap().is_none());
    }

    #[test]
    fn should_normalize_light_state_to_percent_and_rgb() {
        let msg = LightStateResponse {
            key: 7,
            state: true,
            brightness: 0.5,
            red: 1.0,
            green: 0.0,
            blue: 0.5,
            ..LightStateResponse::default()
        };
        let frame = frame_of(LightStateResponse::TYPE, msg.encode());

        let (key, state) = state_from_frame(&frame).unwrap().unwrap();
        assert_eq!(key, 7);
        assert_eq!(state.get("state"), Some(&AttributeValue::Bool(true)));
        assert_eq!(state.get("brightness"), Some(&AttributeValue::Float(50.0)));
        let AttributeValue::Json(color) = state.get("color").unwrap() else {
            panic!("color should be a json object");
        };
        assert_eq!(color["r"], 255.0);
        assert_eq!(color["g"], 0.0);
        assert_eq!(color["b"], 128.0);
    }

    #[test]
    fn should_map_lock_state_names() {
        let msg = crate::proto::LockStateResponse { key: 3, state: 1 };
        let frame = frame_of(crate::proto::LockStateResponse::TYPE, msg.encode());
        let (_, state) = state_from_frame(&frame).unwrap().unwrap();
        assert_eq!(
            state.get("state"),
            Some(&AttributeValue::String("locked".to_string()))
        );
    }

    #[test]
    fn should_map_datetime_listing_to_time_kind() {
        let msg = crate::proto::ListEntitiesDateTimeResponse {
            object_id: "schedule".to_string(),
            key: 9,
            name: "Schedule".to_string(),
            unique_id: String::new(),
        };
        let frame = frame_of(crate::proto::ListEntitiesDateTimeResponse::TYPE, msg.encode());
        let entity = entity_from_frame(&frame).unwrap().unwrap();
        assert_eq!(entity.kind, EntityKind::Time);
    }
}
