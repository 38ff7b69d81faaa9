//! Entity kind — what class of capability a device facet exposes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Enumerated entity classes known to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Light,
    Switch,
    Sensor,
    Cover,
    Climate,
    Fan,
    Lock,
    Alarm,
    Button,
    Number,
    Select,
    Text,
    Time,
    Date,
    Image,
    MediaPlayer,
    Notify,
    Update,
    Vacuum,
    WaterHeater,
    Weather,
    BinarySensor,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Switch => "switch",
            Self::Sensor => "sensor",
            Self::Cover => "cover",
            Self::Climate => "climate",
            Self::Fan => "fan",
            Self::Lock => "lock",
            Self::Alarm => "alarm",
            Self::Button => "button",
            Self::Number => "number",
            Self::Select => "select",
            Self::Text => "text",
            Self::Time => "time",
            Self::Date => "date",
            Self::Image => "image",
            Self::MediaPlayer => "media_player",
            Self::Notify => "notify",
            Self::Update => "update",
            Self::Vacuum => "vacuum",
            Self::WaterHeater => "water_heater",
            Self::Weather => "weather",
            Self::BinarySensor => "binary_sensor",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Self::Light),
            "switch" => Ok(Self::Switch),
            "sensor" => Ok(Self::Sensor),
            "cover" => Ok(Self::Cover),
            "climate" => Ok(Self::Climate),
            "fan" => Ok(Self::Fan),
            "lock" => Ok(Self::Lock),
            "alarm" => Ok(Self::Alarm),
            "button" => Ok(Self::Button),
            "number" => Ok(Self::Number),
            "select" => Ok(Self::Select),
            "text" => Ok(Self::Text),
            "time" => Ok(Self::Time),
            "date" => Ok(Self::Date),
            "image" => Ok(Self::Image),
            "media_player" => Ok(Self::MediaPlayer),
            "notify" => Ok(Self::Notify),
            "update" => Ok(Self::Update),
            "vacuum" => Ok(Self::Vacuum),
            "water_heater" => Ok(Self::WaterHeater),
            "weather" => Ok(Self::Weather),
            "binary_sensor" => Ok(Self::BinarySensor),
            other => Err(ValidationError::UnknownKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_roundtrip_every_kind_through_from_str() {
        let kinds = [
            EntityKind::Light,
            EntityKind::Switch,
            EntityKind::Sensor,
            EntityKind::Cover,
            EntityKind::Climate,
            EntityKind::Fan,
            EntityKind::Lock,
            EntityKind::Alarm,
            EntityKind::Button,
            EntityKind::Number,
            EntityKind::Select,
            EntityKind::Text,
            EntityKind::Time,
            EntityKind::Date,
            EntityKind::Image,
            EntityKind::MediaPlayer,
            EntityKind::Notify,
            EntityKind::Update,
            EntityKind::Vacuum,
            EntityKind::WaterHeater,
            EntityKind::Weather,
            EntityKind::BinarySensor,
        ];
        for kind in kinds {
            let parsed: EntityKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn should_serialize_as_snake_case() {
        let json = serde_json::to_string(&EntityKind::MediaPlayer).unwrap();
        assert_eq!(json, "\"media_player\"");
        let json = serde_json::to_string(&EntityKind::BinarySensor).unwrap();
        assert_eq!(json, "\"binary_sensor\"");
    }

    #[test]
    fn should_reject_unknown_kind() {
        let result: Result<EntityKind, _> = "thermoflux".parse();
        assert!(matches!(result, Err(ValidationError::UnknownKind(_))));
    }
}
