//! Wire payloads of the Hue bridge REST API (v1).

use serde::{Deserialize, Serialize};

/// `GET /api/{user}/config` (also the short unauthenticated form).
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub name: String,
    #[serde(default)]
    pub bridgeid: String,
    #[serde(default)]
    pub modelid: String,
}

/// One light as the bridge reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct Light {
    pub name: String,
    pub state: LightState,
    #[serde(default)]
    pub modelid: String,
    #[serde(default)]
    pub uniqueid: String,
}

/// Current state of a light.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LightState {
    pub on: bool,
    #[serde(default)]
    pub bri: u8,
    #[serde(default)]
    pub hue: u16,
    #[serde(default)]
    pub sat: u8,
    #[serde(default = "default_reachable")]
    pub reachable: bool,
}

fn default_reachable() -> bool {
    true
}

/// One group (room/zone).
#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub lights: Vec<String>,
}

/// One scene.
#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    pub name: String,
    #[serde(default)]
    pub group: Option<String>,
}

/// Body of `PUT .../lights/{id}/state` and `PUT .../groups/{id}/action`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StateBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
}

/// One element of the bridge's array-of-results reply.
#[derive(Debug, Deserialize)]
pub struct ApiResult {
    #[serde(default)]
    pub success: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// Error element of a bridge reply.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub code: i64,
    pub description: String,
}

/// Convert 0-100 brightness to the bridge's 1-254 range.
#[must_use]
pub fn brightness_to_bri(percent: f64) -> u8 {
    let clamped = percent.clamp(0.0, 100.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bri = (clamped * 254.0 / 100.0).round() as u8;
    bri.max(1)
}

/// Convert the bridge's 0-254 brightness back to percent.
#[must_use]
pub fn bri_to_brightness(bri: u8) -> f64 {
    (f64::from(bri) * 100.0 / 254.0).round()
}

/// Convert RGB (0-255 per channel) to the bridge's hue/sat pair.
#[must_use]
pub fn rgb_to_hue_sat(r: f64, g: f64, b: f64) -> (u16, u8) {
    let r = (r / 255.0).clamp(0.0, 1.0);
    let g = (g / 255.0).clamp(0.0, 1.0);
    let b = (b / 255.0).clamp(0.0, 1.0);

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue_degrees = if delta.abs() < f64::EPSILON {
        0.0
    } else if (max - r).abs() < f64::EPSILON {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if (max - g).abs() < f64::EPSILON {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max.abs() < f64::EPSILON {
        0.0
    } else {
        delta / max
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let hue = (hue_degrees / 360.0 * 65535.0).round() as u16;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let sat = (saturation * 254.0).round() as u8;
    (hue, sat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn should_parse_light_payload() {
        let json = r#"{
            "name": "Desk Lamp",
            "state": {"on": true, "bri": 200, "hue": 8402, "sat": 140, "reachable": true},
            "modelid": "LCT015",
            "uniqueid": "00:17:88:01:03:aa:bb:cc-0b"
        }"#;
        let light: Light = serde_json::from_str(json).unwrap();
        assert_eq!(light.name, "Desk Lamp");
        assert!(light.state.on);
        assert_eq!(light.state.bri, 200);
        assert_eq!(light.uniqueid, "00:17:88:01:03:aa:bb:cc-0b");
    }

    #[test]
    fn should_parse_lights_map() {
        let json = r#"{
            "1": {"name": "A", "state": {"on": false}},
            "3": {"name": "B", "state": {"on": true, "bri": 100}}
        }"#;
        let lights: HashMap<String, Light> = serde_json::from_str(json).unwrap();
        assert_eq!(lights.len(), 2);
        assert!(!lights["1"].state.on);
    }

    #[test]
    fn should_parse_error_reply() {
        let json = r#"[{"error": {"type": 101, "address": "/", "description": "link button not pressed"}}]"#;
        let results: Vec<ApiResult> = serde_json::from_str(json).unwrap();
        let error = results[0].error.as_ref().unwrap();
        assert_eq!(error.code, 101);
    }

    #[test]
    fn should_serialize_only_set_fields_of_state_body() {
        let body = StateBody {
            on: Some(true),
            bri: Some(128),
            ..StateBody::default()
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"on":true,"bri":128}"#);
    }

    #[test]
    fn should_scale_brightness_to_bridge_range() {
        assert_eq!(brightness_to_bri(100.0), 254);
        assert_eq!(brightness_to_bri(50.0), 127);
        // The bridge treats 0 as invalid; the floor is 1.
        assert_eq!(brightness_to_bri(0.0), 1);
        assert_eq!(bri_to_brightness(254), 100.0);
    }

    #[test]
    fn should_convert_primary_colors_to_hue_sat() {
        let (hue, sat) = rgb_to_hue_sat(255.0, 0.0, 0.0);
        assert_eq!(hue, 0);
        assert_eq!(sat, 254);

        let (hue, _) = rgb_to_hue_sat(0.0, 255.0, 0.0);
        assert_eq!(hue, 21845);

        let (hue, _) = rgb_to_hue_sat(0.0, 0.0, 255.0);
        assert_eq!(hue, 43690);

        let (_, sat) = rgb_to_hue_sat(255.0, 255.0, 255.0);
        assert_eq!(sat, 0);
    }
}
