//! Telemetry — append-only time-series samples from sensor entities.

use serde::{Deserialize, Serialize};

use crate::id::{EntityId, HomeId};
use crate::time::Timestamp;

/// One sample of a normalized metric.
///
/// `value` is `None` when the sample was not numerically representable; the
/// store persists such samples with a NULL numeric column rather than
/// dropping the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub entity_id: EntityId,
    pub home_id: HomeId,
    /// Normalized metric name (e.g. `"co2"`, `"office_temperature"`).
    pub field: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub ts: Timestamp,
}

impl TelemetryPoint {
    #[must_use]
    pub fn new(
        entity_id: impl Into<EntityId>,
        home_id: impl Into<HomeId>,
        field: impl Into<String>,
        value: Option<f64>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            home_id: home_id.into(),
            field: field.into(),
            value,
            unit: None,
            ts: crate::time::now(),
        }
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    #[must_use]
    pub fn at(mut self, ts: Timestamp) -> Self {
        self.ts = ts;
        self
    }
}

/// Filters for the telemetry read path.
#[derive(Debug, Clone, Default)]
pub struct TelemetryQuery {
    pub field: Option<String>,
    pub since: Option<Timestamp>,
    pub limit: Option<u32>,
}

/// Derive the normalized telemetry field name from an entity name.
///
/// Lowercases and collapses whitespace runs to underscores; names that look
/// like a CO₂ measurement collapse to the canonical `"co2"`.
#[must_use]
pub fn field_from_entity_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    if lowered.contains("co2") || lowered.contains("co₂") {
        return "co2".to_string();
    }
    lowered.split_whitespace().collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_normalize_whitespace_to_underscores() {
        assert_eq!(field_from_entity_name("Office  Temperature"), "office_temperature");
    }

    #[test]
    fn should_collapse_co2_looking_names() {
        assert_eq!(field_from_entity_name("CO2 Reading"), "co2");
        assert_eq!(field_from_entity_name("co2"), "co2");
        assert_eq!(field_from_entity_name("Bedroom CO₂"), "co2");
    }

    #[test]
    fn should_lowercase_plain_names() {
        assert_eq!(field_from_entity_name("Humidity"), "humidity");
    }

    #[test]
    fn should_build_point_with_unit_and_timestamp() {
        let ts = crate::time::now();
        let point = TelemetryPoint::new("e1", "h1", "co2", Some(420.0))
            .with_unit("ppm")
            .at(ts);
        assert_eq!(point.field, "co2");
        assert_eq!(point.value, Some(420.0));
        assert_eq!(point.unit.as_deref(), Some("ppm"));
        assert_eq!(point.ts, ts);
    }
}
