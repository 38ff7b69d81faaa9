//! Shared in-memory storage fake for the application-layer test suites.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use hearth_domain::credential::Credential;
use hearth_domain::device::Device;
use hearth_domain::entity::Entity;
use hearth_domain::error::HearthError;
use hearth_domain::home::Home;
use hearth_domain::id::{DeviceId, EntityId, HomeId};
use hearth_domain::state::EntityState;
use hearth_domain::telemetry::{TelemetryPoint, TelemetryQuery};
use hearth_domain::time::Timestamp;

use crate::ports::{
    CredentialRepository, DeviceRepository, EntityFilter, EntityRepository, EntityStateRepository,
    HomeRepository, TelemetryRepository,
};

#[derive(Default)]
struct Tables {
    homes: Vec<Home>,
    devices: HashMap<DeviceId, Device>,
    entities: HashMap<EntityId, Entity>,
    credentials: HashMap<(DeviceId, String), Credential>,
    entity_state: HashMap<EntityId, EntityState>,
    telemetry: Vec<TelemetryPoint>,
}

/// In-memory implementation of every storage port. Cheap to clone; clones
/// share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raw telemetry rows, for assertions.
    pub fn telemetry_rows(&self) -> Vec<TelemetryPoint> {
        self.lock().telemetry.clone()
    }
}

impl HomeRepository for InMemoryStore {
    async fn insert_home(&self, home: Home) -> Result<Home, HearthError> {
        self.lock().homes.push(home.clone());
        Ok(home)
    }

    async fn home_by_id(&self, id: &HomeId) -> Result<Option<Home>, HearthError> {
        Ok(self.lock().homes.iter().find(|h| &h.id == id).cloned())
    }

    async fn home_by_name(&self, name: &str) -> Result<Option<Home>, HearthError> {
        Ok(self.lock().homes.iter().find(|h| h.name == name).cloned())
    }
}

impl DeviceRepository for InMemoryStore {
    async fn insert_device(&self, device: Device) -> Result<Device, HearthError> {
        self.lock().devices.insert(device.id.clone(), device.clone());
        Ok(device)
    }

    async fn update_device(&self, device: Device) -> Result<Device, HearthError> {
        self.lock().devices.insert(device.id.clone(), device.clone());
        Ok(device)
    }

    async fn device_by_id(&self, id: &DeviceId) -> Result<Option<Device>, HearthError> {
        Ok(self.lock().devices.get(id).cloned())
    }

    async fn device_by_fingerprint(
        &self,
        home_id: &HomeId,
        fingerprint: &str,
    ) -> Result<Option<Device>, HearthError> {
        Ok(self
            .lock()
            .devices
            .values()
            .find(|d| &d.home_id == home_id && d.fingerprint.as_deref() == Some(fingerprint))
            .cloned())
    }

    async fn device_by_address(
        &self,
        home_id: &HomeId,
        address: &str,
        vendor: Option<&str>,
        model: Option<&str>,
    ) -> Result<Option<Device>, HearthError> {
        Ok(self
            .lock()
            .devices
            .values()
            .find(|d| {
                &d.home_id == home_id
                    && d.address.as_deref() == Some(address)
                    && d.vendor.as_deref() == vendor
                    && d.model.as_deref() == model
            })
            .cloned())
    }

    async fn devices_by_home(&self, home_id: &HomeId) -> Result<Vec<Device>, HearthError> {
        Ok(self
            .lock()
            .devices
            .values()
            .filter(|d| &d.home_id == home_id)
            .cloned()
            .collect())
    }

    async fn set_device_paired(
        &self,
        id: &DeviceId,
        paired_at: Timestamp,
    ) -> Result<(), HearthError> {
        if let Some(device) = self.lock().devices.get_mut(id) {
            device.paired_at = Some(paired_at);
        }
        Ok(())
    }

    async fn touch_device_last_seen(
        &self,
        id: &DeviceId,
        last_seen: Timestamp,
    ) -> Result<(), HearthError> {
        if let Some(device) = self.lock().devices.get_mut(id) {
            device.last_seen = last_seen;
        }
        Ok(())
    }
}

impl EntityRepository for InMemoryStore {
    async fn insert_entity(&self, entity: Entity) -> Result<Entity, HearthError> {
        self.lock().entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    async fn entity_by_id(&self, id: &EntityId) -> Result<Option<Entity>, HearthError> {
        Ok(self.lock().entities.get(id).cloned())
    }

    async fn entity_by_key(
        &self,
        device_id: &DeviceId,
        key: &str,
    ) -> Result<Option<Entity>, HearthError> {
        Ok(self
            .lock()
            .entities
            .values()
            .find(|e| &e.device_id == device_id && e.key == key)
            .cloned())
    }

    async fn entities(&self, filter: &EntityFilter) -> Result<Vec<Entity>, HearthError> {
        Ok(self
            .lock()
            .entities
            .values()
            .filter(|e| {
                filter.home_id.as_ref().is_none_or(|h| &e.home_id == h)
                    && filter.device_id.as_ref().is_none_or(|d| &e.device_id == d)
                    && filter.kind.is_none_or(|k| e.kind == k)
            })
            .cloned()
            .collect())
    }
}

impl CredentialRepository for InMemoryStore {
    async fn upsert_credential(&self, credential: Credential) -> Result<(), HearthError> {
        self.lock().credentials.insert(
            (credential.device_id.clone(), credential.kind.clone()),
            credential,
        );
        Ok(())
    }

    async fn credential(
        &self,
        device_id: &DeviceId,
        kind: Option<&str>,
    ) -> Result<Option<Credential>, HearthError> {
        let tables = self.lock();
        Ok(match kind {
            Some(kind) => tables
                .credentials
                .get(&(device_id.clone(), kind.to_string()))
                .cloned(),
            None => tables
                .credentials
                .values()
                .find(|c| &c.device_id == device_id)
                .cloned(),
        })
    }
}

impl EntityStateRepository for InMemoryStore {
    async fn upsert_entity_state(&self, state: EntityState) -> Result<(), HearthError> {
        let mut tables = self.lock();
        match tables.entity_state.get(&state.entity_id) {
            // Last-write-wins: an older sample never replaces a newer row.
            Some(existing) if existing.updated_at > state.updated_at => Ok(()),
            _ => {
                tables.entity_state.insert(state.entity_id.clone(), state);
                Ok(())
            }
        }
    }

    async fn entity_state(
        &self,
        entity_id: &EntityId,
    ) -> Result<Option<EntityState>, HearthError> {
        Ok(self.lock().entity_state.get(entity_id).cloned())
    }
}

impl TelemetryRepository for InMemoryStore {
    async fn insert_telemetry_batch(
        &self,
        points: &[TelemetryPoint],
    ) -> Result<(), HearthError> {
        self.lock().telemetry.extend_from_slice(points);
        Ok(())
    }

    async fn telemetry_by_entity(
        &self,
        entity_id: &EntityId,
        query: &TelemetryQuery,
    ) -> Result<Vec<TelemetryPoint>, HearthError> {
        let tables = self.lock();
        let mut rows: Vec<TelemetryPoint> = tables
            .telemetry
            .iter()
            .filter(|p| {
                &p.entity_id == entity_id
                    && query.field.as_deref().is_none_or(|f| p.field == f)
                    && query.since.is_none_or(|since| p.ts >= since)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.ts);
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn telemetry_by_home(
        &self,
        home_id: &HomeId,
        query: &TelemetryQuery,
    ) -> Result<Vec<TelemetryPoint>, HearthError> {
        let tables = self.lock();
        let mut rows: Vec<TelemetryPoint> = tables
            .telemetry
            .iter()
            .filter(|p| {
                &p.home_id == home_id
                    && query.field.as_deref().is_none_or(|f| p.field == f)
                    && query.since.is_none_or(|since| p.ts >= since)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.ts);
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn purge_telemetry_before(&self, cutoff: Timestamp) -> Result<u64, HearthError> {
        let mut tables = self.lock();
        let before = tables.telemetry.len();
        tables.telemetry.retain(|p| p.ts >= cutoff);
        Ok((before - tables.telemetry.len()) as u64)
    }
}
