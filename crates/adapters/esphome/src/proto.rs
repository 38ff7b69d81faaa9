//! Message catalog for the ESPHome native API.
//!
//! Numeric message-type ids and field tags mirror the upstream ESPHome
//! protobuf schema (`api.proto`) and must stay bit-compatible with it.
//! Messages are plain structs with hand-rolled proto3 encode/decode built
//! from the [`wire`](crate::wire) primitives; unknown fields are skipped so
//! newer firmware remains readable.

use crate::wire::{self, WireError};

macro_rules! field_type {
    (uint32) => { u32 };
    (bool) => { bool };
    (fixed32) => { u32 };
    (float) => { f32 };
    (string) => { String };
}

macro_rules! put_field {
    (uint32, $buf:expr, $num:expr, $value:expr) => {
        wire::put_uint32($buf, $num, *$value)
    };
    (bool, $buf:expr, $num:expr, $value:expr) => {
        wire::put_bool($buf, $num, *$value)
    };
    (fixed32, $buf:expr, $num:expr, $value:expr) => {
        wire::put_fixed32($buf, $num, *$value)
    };
    (float, $buf:expr, $num:expr, $value:expr) => {
        wire::put_float($buf, $num, *$value)
    };
    (string, $buf:expr, $num:expr, $value:expr) => {
        wire::put_string($buf, $num, $value)
    };
}

macro_rules! read_field {
    (uint32, $buf:expr, $pos:expr, $slot:expr) => {
        *$slot = wire::read_uint32($buf, $pos)?
    };
    (bool, $buf:expr, $pos:expr, $slot:expr) => {
        *$slot = wire::read_bool($buf, $pos)?
    };
    (fixed32, $buf:expr, $pos:expr, $slot:expr) => {
        *$slot = wire::read_fixed32($buf, $pos)?
    };
    (float, $buf:expr, $pos:expr, $slot:expr) => {
        *$slot = wire::read_float($buf, $pos)?
    };
    (string, $buf:expr, $pos:expr, $slot:expr) => {
        *$slot = wire::read_string($buf, $pos)?
    };
}

macro_rules! message {
    (
        $(#[$meta:meta])*
        $name:ident = $id:expr $(; $( $num:literal => $field:ident : $kind:ident ),+ $(,)? )?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $( $( pub $field: field_type!($kind), )+ )?
        }

        impl $name {
            /// Numeric message type in the upstream schema.
            pub const TYPE: u32 = $id;

            /// Encode the payload (without framing).
            #[must_use]
            pub fn encode(&self) -> Vec<u8> {
                #[allow(unused_mut)]
                let mut buf = Vec::new();
                $( $( put_field!($kind, &mut buf, $num, &self.$field); )+ )?
                buf
            }

            /// Decode a payload, skipping unknown fields.
            ///
            /// # Errors
            ///
            /// Returns [`WireError`] on a malformed payload.
            pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
                #[allow(unused_mut)]
                let mut msg = Self::default();
                let mut pos = 0;
                while pos < payload.len() {
                    let tag = wire::read_varint(payload, &mut pos)?;
                    #[allow(clippy::cast_possible_truncation)]
                    let field_no = (tag >> 3) as u32;
                    let wire_type = (tag & 7) as u8;
                    match field_no {
                        $( $( $num => { read_field!($kind, payload, &mut pos, &mut msg.$field); } )+ )?
                        _ => wire::skip_field(payload, &mut pos, wire_type)?,
                    }
                }
                Ok(msg)
            }
        }
    };
}

// ---- Connection management -------------------------------------------------

message! {
    /// Opening message of every session.
    HelloRequest = 1;
    1 => client_info: string,
    2 => api_version_major: uint32,
    3 => api_version_minor: uint32,
}

message! {
    HelloResponse = 2;
    1 => api_version_major: uint32,
    2 => api_version_minor: uint32,
    3 => server_info: string,
    4 => name: string,
}

message! {
    /// Authentication; the upstream schema calls this ConnectRequest.
    AuthenticationRequest = 3;
    1 => password: string,
}

message! {
    AuthenticationResponse = 4;
    1 => invalid_password: bool,
}

message! { DisconnectRequest = 5 }
message! { DisconnectResponse = 6 }
message! { PingRequest = 7 }
message! { PingResponse = 8 }
message! { DeviceInfoRequest = 9 }

message! {
    DeviceInfoResponse = 10;
    1 => uses_password: bool,
    2 => name: string,
    3 => mac_address: string,
    4 => esphome_version: string,
    5 => compilation_time: string,
    6 => model: string,
    7 => has_deep_sleep: bool,
    8 => project_name: string,
    9 => project_version: string,
    10 => webserver_port: uint32,
    13 => friendly_name: string,
    16 => manufacturer: string,
    17 => suggested_area: string,
}

message! { ListEntitiesRequest = 11 }
message! { ListEntitiesDoneResponse = 19 }
message! { SubscribeStatesRequest = 20 }

message! {
    SubscribeLogsRequest = 28;
    1 => level: uint32,
    2 => dump_config: bool,
}

message! {
    SubscribeLogsResponse = 29;
    1 => level: uint32,
    3 => message: string,
    4 => send_failed: bool,
}

// ---- Entity enumeration ----------------------------------------------------
//
// Every ListEntities*Response shares the same identity core: object_id,
// 32-bit key, name, unique_id.

message! {
    ListEntitiesBinarySensorResponse = 12;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    5 => device_class: string,
    6 => is_status_binary_sensor: bool,
}

message! {
    ListEntitiesCoverResponse = 13;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    5 => assumed_state: bool,
    6 => supports_position: bool,
    7 => supports_tilt: bool,
    8 => device_class: string,
}

message! {
    ListEntitiesFanResponse = 14;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    5 => supports_oscillation: bool,
    6 => supports_speed: bool,
    7 => supports_direction: bool,
    8 => supported_speed_count: uint32,
}

message! {
    ListEntitiesLightResponse = 15;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    5 => legacy_supports_brightness: bool,
    6 => legacy_supports_rgb: bool,
    7 => legacy_supports_white_value: bool,
    8 => legacy_supports_color_temperature: bool,
    9 => min_mireds: float,
    10 => max_mireds: float,
}

message! {
    ListEntitiesSensorResponse = 16;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    5 => icon: string,
    6 => unit_of_measurement: string,
    7 => accuracy_decimals: uint32,
    8 => force_update: bool,
    9 => device_class: string,
    10 => state_class: uint32,
}

message! {
    ListEntitiesSwitchResponse = 17;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    5 => icon: string,
    6 => assumed_state: bool,
    7 => device_class: string,
}

message! {
    ListEntitiesTextSensorResponse = 18;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    5 => icon: string,
    6 => device_class: string,
}

message! {
    ListEntitiesCameraResponse = 42;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
}

message! {
    ListEntitiesClimateResponse = 45;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    5 => supports_current_temperature: bool,
    6 => supports_two_point_target_temperature: bool,
    8 => visual_min_temperature: float,
    9 => visual_max_temperature: float,
    10 => visual_target_temperature_step: float,
}

message! {
    ListEntitiesNumberResponse = 48;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    5 => icon: string,
    6 => min_value: float,
    7 => max_value: float,
    8 => step: float,
}

message! {
    ListEntitiesSelectResponse = 51;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    5 => icon: string,
}

message! {
    ListEntitiesSirenResponse = 54;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
}

message! {
    ListEntitiesLockResponse = 57;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    8 => supports_open: bool,
}

message! {
    ListEntitiesButtonResponse = 60;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    5 => icon: string,
    6 => device_class: string,
}

message! {
    ListEntitiesMediaPlayerResponse = 62;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
}

message! {
    ListEntitiesAlarmControlPanelResponse = 94;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
}

message! {
    ListEntitiesTextResponse = 97;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
}

message! {
    ListEntitiesDateResponse = 100;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
}

message! {
    ListEntitiesTimeResponse = 103;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
}

message! {
    ListEntitiesEventResponse = 106;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
}

message! {
    ListEntitiesValveResponse = 108;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    5 => device_class: string,
    6 => assumed_state: bool,
    7 => supports_position: bool,
}

message! {
    ListEntitiesDateTimeResponse = 111;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
}

message! {
    ListEntitiesUpdateResponse = 114;
    1 => object_id: string,
    2 => key: fixed32,
    3 => name: string,
    4 => unique_id: string,
    5 => icon: string,
    6 => device_class: string,
}

// ---- State updates ---------------------------------------------------------

message! {
    BinarySensorStateResponse = 21;
    1 => key: fixed32,
    2 => state: bool,
    3 => missing_state: bool,
}

message! {
    CoverStateResponse = 22;
    1 => key: fixed32,
    2 => legacy_state: uint32,
    3 => position: float,
    4 => tilt: float,
    5 => current_operation: uint32,
}

message! {
    FanStateResponse = 23;
    1 => key: fixed32,
    2 => state: bool,
    3 => oscillating: bool,
    4 => speed: uint32,
    5 => direction: uint32,
    6 => speed_level: uint32,
}

message! {
    LightStateResponse = 24;
    1 => key: fixed32,
    2 => state: bool,
    3 => brightness: float,
    4 => color_brightness: float,
    5 => red: float,
    6 => green: float,
    7 => blue: float,
    8 => white: float,
    9 => color_temperature: float,
    10 => color_mode: uint32,
    11 => cold_white: float,
    12 => warm_white: float,
    13 => effect: string,
}

message! {
    SensorStateResponse = 25;
    1 => key: fixed32,
    2 => state: float,
    3 => missing_state: bool,
}

message! {
    SwitchStateResponse = 26;
    1 => key: fixed32,
    2 => state: bool,
}

message! {
    TextSensorStateResponse = 27;
    1 => key: fixed32,
    2 => state: string,
    3 => missing_state: bool,
}

message! {
    ClimateStateResponse = 46;
    1 => key: fixed32,
    2 => mode: uint32,
    3 => current_temperature: float,
    4 => target_temperature: float,
    5 => target_temperature_low: float,
    6 => target_temperature_high: float,
    8 => action: uint32,
}

message! {
    NumberStateResponse = 49;
    1 => key: fixed32,
    2 => state: float,
    3 => missing_state: bool,
}

message! {
    SelectStateResponse = 52;
    1 => key: fixed32,
    2 => state: string,
    3 => missing_state: bool,
}

message! {
    SirenStateResponse = 55;
    1 => key: fixed32,
    2 => state: bool,
}

message! {
    LockStateResponse = 58;
    1 => key: fixed32,
    2 => state: uint32,
}

message! {
    MediaPlayerStateResponse = 63;
    1 => key: fixed32,
    2 => state: uint32,
    3 => volume: float,
    4 => muted: bool,
}

message! {
    AlarmControlPanelStateResponse = 95;
    1 => key: fixed32,
    2 => state: uint32,
}

message! {
    TextStateResponse = 98;
    1 => key: fixed32,
    2 => state: string,
    3 => missing_state: bool,
}

message! {
    DateStateResponse = 101;
    1 => key: fixed32,
    2 => missing_state: bool,
    3 => year: uint32,
    4 => month: uint32,
    5 => day: uint32,
}

message! {
    TimeStateResponse = 104;
    1 => key: fixed32,
    2 => missing_state: bool,
    3 => hour: uint32,
    4 => minute: uint32,
    5 => second: uint32,
}

message! {
    EventResponse = 107;
    1 => key: fixed32,
    2 => event_type: string,
}

message! {
    ValveStateResponse = 109;
    1 => key: fixed32,
    2 => position: float,
    3 => current_operation: uint32,
}

message! {
    DateTimeStateResponse = 112;
    1 => key: fixed32,
    2 => missing_state: bool,
    3 => epoch_seconds: fixed32,
}

message! {
    UpdateStateResponse = 115;
    1 => key: fixed32,
    2 => missing_state: bool,
    3 => in_progress: bool,
    4 => has_progress: bool,
    5 => progress: float,
    6 => current_version: string,
    7 => latest_version: string,
    8 => title: string,
}

// ---- Commands --------------------------------------------------------------

message! {
    CoverCommandRequest = 30;
    1 => key: fixed32,
    2 => has_legacy_command: bool,
    3 => legacy_command: uint32,
    4 => has_position: bool,
    5 => position: float,
    6 => has_tilt: bool,
    7 => tilt: float,
    8 => stop: bool,
}

message! {
    FanCommandRequest = 31;
    1 => key: fixed32,
    2 => has_state: bool,
    3 => state: bool,
    4 => has_speed: bool,
    5 => speed: uint32,
    6 => has_oscillating: bool,
    7 => oscillating: bool,
    8 => has_direction: bool,
    9 => direction: uint32,
    10 => has_speed_level: bool,
    11 => speed_level: uint32,
}

message! {
    LightCommandRequest = 32;
    1 => key: fixed32,
    2 => has_state: bool,
    3 => state: bool,
    4 => has_brightness: bool,
    5 => brightness: float,
    6 => has_rgb: bool,
    7 => red: float,
    8 => green: float,
    9 => blue: float,
    10 => has_white: bool,
    11 => white: float,
    12 => has_color_temperature: bool,
    13 => color_temperature: float,
    14 => has_transition_length: bool,
    15 => transition_length: uint32,
    16 => has_flash_length: bool,
    17 => flash_length: uint32,
    18 => has_effect: bool,
    19 => effect: string,
}

message! {
    SwitchCommandRequest = 33;
    1 => key: fixed32,
    2 => state: bool,
}

message! {
    ClimateCommandRequest = 47;
    1 => key: fixed32,
    2 => has_mode: bool,
    3 => mode: uint32,
    4 => has_target_temperature: bool,
    5 => target_temperature: float,
    6 => has_target_temperature_low: bool,
    7 => target_temperature_low: float,
    8 => has_target_temperature_high: bool,
    9 => target_temperature_high: float,
}

message! {
    NumberCommandRequest = 50;
    1 => key: fixed32,
    2 => state: float,
}

message! {
    SelectCommandRequest = 53;
    1 => key: fixed32,
    2 => state: string,
}

message! {
    SirenCommandRequest = 56;
    1 => key: fixed32,
    2 => has_state: bool,
    3 => state: bool,
}

message! {
    LockCommandRequest = 59;
    1 => key: fixed32,
    2 => command: uint32,
    3 => has_code: bool,
    4 => code: string,
}

message! {
    ButtonCommandRequest = 61;
    1 => key: fixed32,
}

message! {
    MediaPlayerCommandRequest = 64;
    1 => key: fixed32,
    2 => has_command: bool,
    3 => command: uint32,
    4 => has_volume: bool,
    5 => volume: float,
    6 => has_media_url: bool,
    7 => media_url: string,
}

message! {
    AlarmControlPanelCommandRequest = 96;
    1 => key: fixed32,
    2 => command: uint32,
    3 => code: string,
}

message! {
    TextCommandRequest = 99;
    1 => key: fixed32,
    2 => state: string,
}

message! {
    DateCommandRequest = 102;
    1 => key: fixed32,
    2 => year: uint32,
    3 => month: uint32,
    4 => day: uint32,
}

message! {
    TimeCommandRequest = 105;
    1 => key: fixed32,
    2 => hour: uint32,
    3 => minute: uint32,
    4 => second: uint32,
}

message! {
    ValveCommandRequest = 110;
    1 => key: fixed32,
    2 => has_position: bool,
    3 => position: float,
    4 => stop: bool,
}

message! {
    DateTimeCommandRequest = 113;
    1 => key: fixed32,
    2 => epoch_seconds: fixed32,
}

message! {
    UpdateCommandRequest = 116;
    1 => key: fixed32,
    2 => command: uint32,
}

/// Lock command values (`LockCommand` in the upstream schema).
pub mod lock_command {
    pub const UNLOCK: u32 = 0;
    pub const LOCK: u32 = 1;
    pub const OPEN: u32 = 2;
}
