//! Device — a physical unit speaking one protocol.

use serde::{Deserialize, Serialize};

use crate::error::{HearthError, ValidationError};
use crate::id::{DeviceId, HomeId};
use crate::state::StateMap;
use crate::time::Timestamp;

/// A paired (or discovered) physical unit.
///
/// The `fingerprint`, when present, uniquely identifies the same physical
/// unit across reboots and address changes; the registry deduplicates on
/// `(home_id, fingerprint)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub home_id: HomeId,
    /// Protocol tag identifying the owning driver (e.g. `"esphome"`).
    pub protocol: String,
    pub name: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub address: Option<String>,
    pub fingerprint: Option<String>,
    pub paired_at: Option<Timestamp>,
    pub last_seen: Timestamp,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HearthError::Validation`] when `name` or `protocol` is empty.
    pub fn validate(&self) -> Result<(), HearthError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.protocol.is_empty() {
            return Err(ValidationError::EmptyProtocol.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    home_id: Option<HomeId>,
    protocol: Option<String>,
    name: Option<String>,
    vendor: Option<String>,
    model: Option<String>,
    address: Option<String>,
    fingerprint: Option<String>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn home_id(mut self, home_id: HomeId) -> Self {
        self.home_id = Some(home_id);
        self
    }

    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    #[must_use]
    pub fn fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`HearthError::Validation`] if `name` or `protocol` is
    /// missing or empty.
    pub fn build(self) -> Result<Device, HearthError> {
        let device = Device {
            id: self.id.unwrap_or_else(DeviceId::generate),
            home_id: self.home_id.unwrap_or_else(|| HomeId::new("")),
            protocol: self.protocol.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            vendor: self.vendor,
            model: self.model,
            address: self.address,
            fingerprint: self.fingerprint,
            paired_at: None,
            last_seen: crate::time::now(),
        };
        device.validate()?;
        Ok(device)
    }
}

/// What a driver's `discover()` yields: everything known about a device
/// before the registry has seen it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub name: String,
    pub protocol: String,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub address: Option<String>,
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub metadata: StateMap,
}

impl DeviceDescriptor {
    #[must_use]
    pub fn new(id: impl Into<DeviceId>, name: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            protocol: protocol.into(),
            vendor: None,
            model: None,
            address: None,
            fingerprint: None,
            metadata: StateMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_valid_device_when_required_fields_provided() {
        let device = Device::builder()
            .home_id(HomeId::generate())
            .protocol("esphome")
            .name("Office Air Monitor")
            .build()
            .unwrap();
        assert_eq!(device.name, "Office Air Monitor");
        assert_eq!(device.protocol, "esphome");
        assert!(device.paired_at.is_none());
        assert!(device.fingerprint.is_none());
    }

    #[test]
    fn should_return_validation_error_when_name_is_empty() {
        let result = Device::builder().protocol("esphome").build();
        assert!(matches!(
            result,
            Err(HearthError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_return_validation_error_when_protocol_is_empty() {
        let result = Device::builder().name("Lamp").build();
        assert!(matches!(
            result,
            Err(HearthError::Validation(ValidationError::EmptyProtocol))
        ));
    }

    #[test]
    fn should_build_device_with_all_optional_fields() {
        let device = Device::builder()
            .protocol("hue")
            .name("Hue Bridge")
            .vendor("Signify")
            .model("BSB002")
            .address("10.0.0.2")
            .fingerprint("001788fffe23")
            .build()
            .unwrap();

        assert_eq!(device.vendor.as_deref(), Some("Signify"));
        assert_eq!(device.model.as_deref(), Some("BSB002"));
        assert_eq!(device.address.as_deref(), Some("10.0.0.2"));
        assert_eq!(device.fingerprint.as_deref(), Some("001788fffe23"));
    }

    #[test]
    fn should_roundtrip_descriptor_through_serde_json() {
        let desc = DeviceDescriptor::new("esphome-aabbcc", "Air Monitor", "esphome");
        let json = serde_json::to_string(&desc).unwrap();
        let parsed: DeviceDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, desc.id);
        assert_eq!(parsed.name, "Air Monitor");
    }
}
