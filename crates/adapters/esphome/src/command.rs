//! Normalized command → typed wire message translation.
//!
//! Unsupported input produces an error before anything touches the wire:
//! the caller turns it into a failed invoke result without a write.

use hearth_domain::command::CommandRequest;
use hearth_domain::entity::EntityKind;
use hearth_domain::state::AttributeValue;

use crate::entities::EspHomeEntity;
use crate::frame::Frame;
use crate::proto;

/// Why a command could not be translated.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("Unsupported entity type")]
    UnsupportedKind,
    #[error("Unsupported capability")]
    UnsupportedCapability,
    #[error("invalid value for capability: {0}")]
    InvalidValue(&'static str),
}

fn as_bool(value: &AttributeValue) -> Result<bool, TranslateError> {
    match value {
        AttributeValue::Bool(b) => Ok(*b),
        AttributeValue::Int(i) => Ok(*i != 0),
        _ => Err(TranslateError::InvalidValue("expected a boolean")),
    }
}

fn as_f64(value: &AttributeValue) -> Result<f64, TranslateError> {
    value
        .as_f64()
        .ok_or(TranslateError::InvalidValue("expected a number"))
}

fn as_str(value: &AttributeValue) -> Result<&str, TranslateError> {
    value
        .as_str()
        .ok_or(TranslateError::InvalidValue("expected a string"))
}

#[allow(clippy::cast_possible_truncation)]
fn as_f32(value: &AttributeValue) -> Result<f32, TranslateError> {
    Ok(as_f64(value)? as f32)
}

fn rgb_component(value: &serde_json::Value, channel: &'static str) -> Result<f32, TranslateError> {
    #[allow(clippy::cast_possible_truncation)]
    value
        .get(channel)
        .and_then(serde_json::Value::as_f64)
        .map(|v| (v / 255.0) as f32)
        .ok_or(TranslateError::InvalidValue("expected {r, g, b}"))
}

/// Translate a normalized command for `entity` into a ready-to-send frame.
///
/// # Errors
///
/// Returns [`TranslateError`] for kinds or capabilities outside the
/// translation table; nothing is written to the wire in that case.
pub fn translate(
    entity: &EspHomeEntity,
    request: &CommandRequest,
) -> Result<Frame, TranslateError> {
    let key = entity.key;
    let capability = request.capability.as_str();
    let value = &request.value;

    let frame = match entity.kind {
        EntityKind::Switch => match capability {
            "on_off" => {
                let msg = proto::SwitchCommandRequest {
                    key,
                    state: as_bool(value)?,
                };
                Frame::new(proto::SwitchCommandRequest::TYPE, msg.encode())
            }
            _ => return Err(TranslateError::UnsupportedCapability),
        },
        EntityKind::Light => match capability {
            "on_off" => {
                let msg = proto::LightCommandRequest {
                    key,
                    has_state: true,
                    state: as_bool(value)?,
                    ..proto::LightCommandRequest::default()
                };
                Frame::new(proto::LightCommandRequest::TYPE, msg.encode())
            }
            "brightness" => {
                let level = as_f32(value)?;
                let msg = proto::LightCommandRequest {
                    key,
                    has_state: true,
                    state: true,
                    has_brightness: true,
                    brightness: level / 100.0,
                    ..proto::LightCommandRequest::default()
                };
                Frame::new(proto::LightCommandRequest::TYPE, msg.encode())
            }
            "color_rgb" => {
                let AttributeValue::Json(rgb) = value else {
                    return Err(TranslateError::InvalidValue("expected {r, g, b}"));
                };
                let msg = proto::LightCommandRequest {
                    key,
                    has_state: true,
                    state: true,
                    has_rgb: true,
                    red: rgb_component(rgb, "r")?,
                    green: rgb_component(rgb, "g")?,
                    blue: rgb_component(rgb, "b")?,
                    ..proto::LightCommandRequest::default()
                };
                Frame::new(proto::LightCommandRequest::TYPE, msg.encode())
            }
            _ => return Err(TranslateError::UnsupportedCapability),
        },
        // Buttons have a single action; the capability name is ignored.
        EntityKind::Button => {
            let msg = proto::ButtonCommandRequest { key };
            Frame::new(proto::ButtonCommandRequest::TYPE, msg.encode())
        }
        EntityKind::Number => match capability {
            "numeric" => {
                let msg = proto::NumberCommandRequest {
                    key,
                    state: as_f32(value)?,
                };
                Frame::new(proto::NumberCommandRequest::TYPE, msg.encode())
            }
            _ => return Err(TranslateError::UnsupportedCapability),
        },
        EntityKind::Select => match capability {
            "select" => {
                let msg = proto::SelectCommandRequest {
                    key,
                    state: as_str(value)?.to_string(),
                };
                Frame::new(proto::SelectCommandRequest::TYPE, msg.encode())
            }
            _ => return Err(TranslateError::UnsupportedCapability),
        },
        EntityKind::Fan => match capability {
            "on_off" => {
                let msg = proto::FanCommandRequest {
                    key,
                    has_state: true,
                    state: as_bool(value)?,
                    ..proto::FanCommandRequest::default()
                };
                Frame::new(proto::FanCommandRequest::TYPE, msg.encode())
            }
            "speed" => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let level = as_f64(value)?.round().max(0.0) as u32;
                let msg = proto::FanCommandRequest {
                    key,
                    has_state: true,
                    state: true,
                    has_speed_level: true,
                    speed_level: level,
                    ..proto::FanCommandRequest::default()
                };
                Frame::new(proto::FanCommandRequest::TYPE, msg.encode())
            }
            _ => return Err(TranslateError::UnsupportedCapability),
        },
        EntityKind::Cover => match capability {
            "position" => {
                let msg = proto::CoverCommandRequest {
                    key,
                    has_position: true,
                    position: as_f32(value)? / 100.0,
                    ..proto::CoverCommandRequest::default()
                };
                Frame::new(proto::CoverCommandRequest::TYPE, msg.encode())
            }
            _ => return Err(TranslateError::UnsupportedCapability),
        },
        EntityKind::Climate => match capability {
            "temperature" => {
                let msg = proto::ClimateCommandRequest {
                    key,
                    has_target_temperature: true,
                    target_temperature: as_f32(value)?,
                    ..proto::ClimateCommandRequest::default()
                };
                Frame::new(proto::ClimateCommandRequest::TYPE, msg.encode())
            }
            _ => return Err(TranslateError::UnsupportedCapability),
        },
        EntityKind::Lock => match capability {
            "lock" => {
                let command = match as_str(value)? {
                    "lock" => proto::lock_command::LOCK,
                    "unlock" => proto::lock_command::UNLOCK,
                    "open" => proto::lock_command::OPEN,
                    _ => {
                        return Err(TranslateError::InvalidValue(
                            "expected lock, unlock, or open",
                        ));
                    }
                };
                let msg = proto::LockCommandRequest {
                    key,
                    command,
                    ..proto::LockCommandRequest::default()
                };
                Frame::new(proto::LockCommandRequest::TYPE, msg.encode())
            }
            _ => return Err(TranslateError::UnsupportedCapability),
        },
        _ => return Err(TranslateError::UnsupportedKind),
    };

    Ok(frame)
}
