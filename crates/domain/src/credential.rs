//! Credential — opaque per-device secret material.

use serde::{Deserialize, Serialize};

use crate::id::DeviceId;
use crate::time::Timestamp;

/// An opaque credential blob with a kind tag.
///
/// One current blob exists per `(device_id, kind)`. Encryption at rest is
/// the persistence layer's concern; the core treats `data` as bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub device_id: DeviceId,
    /// Protocol-defined kind tag (e.g. `"esphome"`, `"hue"`).
    pub kind: String,
    pub data: Vec<u8>,
    pub created_at: Timestamp,
}

impl Credential {
    #[must_use]
    pub fn new(device_id: impl Into<DeviceId>, kind: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            device_id: device_id.into(),
            kind: kind.into(),
            data,
            created_at: crate::time::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_carry_opaque_bytes() {
        let cred = Credential::new("d1", "hue", b"username-token".to_vec());
        assert_eq!(cred.kind, "hue");
        assert_eq!(cred.data, b"username-token");
    }

    #[test]
    fn should_allow_empty_blob_for_self_pairing_protocols() {
        let cred = Credential::new("d1", "esphome", Vec::new());
        assert!(cred.data.is_empty());
    }
}
