//! Entity — an addressable capability on a device.
//!
//! An entity represents a single observable/controllable facet of a device
//! (a light, a sensor's measurement channel, a switch's relay, …).

mod capability;
mod kind;

pub use capability::Capability;
pub use kind::EntityKind;

use serde::{Deserialize, Serialize};

use crate::error::{HearthError, ValidationError};
use crate::id::{DeviceId, EntityId, HomeId};
use crate::state::StateMap;

/// An observable/controllable facet of a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub device_id: DeviceId,
    pub home_id: HomeId,
    pub kind: EntityKind,
    /// Stable driver-local key; unique within the owning device.
    pub key: String,
    pub name: String,
    pub capability: Capability,
}

impl Entity {
    /// Create a builder for constructing an [`Entity`].
    #[must_use]
    pub fn builder() -> EntityBuilder {
        EntityBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HearthError::Validation`] when `key` or `name` is empty.
    pub fn validate(&self) -> Result<(), HearthError> {
        if self.key.is_empty() {
            return Err(ValidationError::EmptyEntityKey.into());
        }
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Entity`].
#[derive(Debug, Default)]
pub struct EntityBuilder {
    id: Option<EntityId>,
    device_id: Option<DeviceId>,
    home_id: Option<HomeId>,
    kind: Option<EntityKind>,
    key: Option<String>,
    name: Option<String>,
    capability: Option<Capability>,
}

impl EntityBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn device_id(mut self, device_id: impl Into<DeviceId>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    #[must_use]
    pub fn home_id(mut self, home_id: impl Into<HomeId>) -> Self {
        self.home_id = Some(home_id.into());
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    /// Consume the builder, validate, and return an [`Entity`].
    ///
    /// The key defaults to the entity id when not set explicitly, matching
    /// how descriptors without a `key` metadata entry are registered.
    ///
    /// # Errors
    ///
    /// Returns [`HearthError::Validation`] if required fields are missing or
    /// empty.
    pub fn build(self) -> Result<Entity, HearthError> {
        let id = self.id.unwrap_or_else(EntityId::generate);
        let kind = self.kind.unwrap_or(EntityKind::Sensor);
        let entity = Entity {
            key: self.key.unwrap_or_else(|| id.as_str().to_string()),
            id,
            device_id: self.device_id.unwrap_or_else(|| DeviceId::new("")),
            home_id: self.home_id.unwrap_or_else(|| HomeId::new("")),
            kind,
            name: self.name.unwrap_or_default(),
            capability: self.capability.unwrap_or_else(|| Capability::new(kind.as_str())),
        };
        entity.validate()?;
        Ok(entity)
    }
}

/// What a driver's `entities()` yields for one entity it currently knows.
///
/// The registry dedups on `(device_id, key)` where the key is
/// `metadata["key"]` when present, otherwise the descriptor id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub capability: Capability,
    #[serde(default)]
    pub metadata: StateMap,
}

impl EntityDescriptor {
    #[must_use]
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            capability: Capability::new(kind.as_str()),
            metadata: StateMap::new(),
        }
    }

    /// The stable registry key for this descriptor.
    #[must_use]
    pub fn key(&self) -> String {
        self.metadata
            .get("key")
            .and_then(|v| v.as_str())
            .map_or_else(|| self.id.as_str().to_string(), ToString::to_string)
    }
}
