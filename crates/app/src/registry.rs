//! Registry — device/entity identity, fingerprint dedup, credential storage.
//!
//! The registry exclusively owns device, entity and credential mutation.
//! All operations run inside the persistence layer's transactional context
//! and are safe under concurrent callers.

use std::sync::Arc;

use hearth_domain::credential::Credential;
use hearth_domain::device::{Device, DeviceDescriptor};
use hearth_domain::entity::{Entity, EntityDescriptor};
use hearth_domain::error::{NotFoundError, Result};
use hearth_domain::home::Home;
use hearth_domain::id::{DeviceId, EntityId, HomeId};
use hearth_domain::time::now;

use crate::ports::{
    CredentialRepository, DeviceRepository, EntityFilter, EntityRepository, HomeRepository,
};

/// Application service for identity bookkeeping, generic over the storage
/// ports so tests can swap in in-memory fakes.
pub struct Registry<S> {
    store: S,
}

impl<S> Registry<S>
where
    S: HomeRepository + DeviceRepository + EntityRepository + CredentialRepository,
{
    /// Create a new registry backed by the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Return the home with `name`, creating it when absent.
    ///
    /// # Errors
    ///
    /// Returns [`HearthError::Validation`] for an empty name, or a storage
    /// error from the repository.
    pub async fn get_or_create_home(
        &self,
        name: &str,
        timezone: Option<String>,
    ) -> Result<Home> {
        if let Some(home) = self.store.home_by_name(name).await? {
            return Ok(home);
        }
        let home = Home::new(name, timezone)?;
        self.store.insert_home(home).await
    }

    /// Insert or update a device from a discovery descriptor.
    ///
    /// Dedup rule, evaluated in order:
    /// 1. descriptor fingerprint present → match `(home_id, fingerprint)`;
    ///    on hit, refresh `address`, `last_seen` and `name`.
    /// 2. descriptor address present → match
    ///    `(home_id, address, vendor, model)`; on hit, refresh `last_seen`.
    /// 3. otherwise insert a new row.
    ///
    /// # Errors
    ///
    /// Returns a validation or storage error from the repository.
    #[tracing::instrument(skip(self, descriptor), fields(device = %descriptor.id))]
    pub async fn upsert_device(
        &self,
        descriptor: &DeviceDescriptor,
        home_id: &HomeId,
    ) -> Result<Device> {
        if let Some(fingerprint) = descriptor
            .fingerprint
            .as_deref()
            .filter(|fp| !fp.is_empty())
        {
            if let Some(existing) = self
                .store
                .device_by_fingerprint(home_id, fingerprint)
                .await?
            {
                let updated = Device {
                    address: descriptor.address.clone(),
                    last_seen: now(),
                    name: descriptor.name.clone(),
                    ..existing
                };
                return self.store.update_device(updated).await;
            }
        } else if let Some(address) = descriptor.address.as_deref().filter(|a| !a.is_empty()) {
            if let Some(existing) = self
                .store
                .device_by_address(
                    home_id,
                    address,
                    descriptor.vendor.as_deref(),
                    descriptor.model.as_deref(),
                )
                .await?
            {
                let updated = Device {
                    last_seen: now(),
                    ..existing
                };
                return self.store.update_device(updated).await;
            }
        }

        let device = Device::builder()
            .id(descriptor.id.clone())
            .home_id(home_id.clone())
            .protocol(&descriptor.protocol)
            .name(&descriptor.name)
            .build()
            .map(|mut device| {
                device.vendor = descriptor.vendor.clone();
                device.model = descriptor.model.clone();
                device.address = descriptor.address.clone();
                device.fingerprint = descriptor.fingerprint.clone();
                device
            })?;
        self.store.insert_device(device).await
    }

    /// Insert an entity from a driver descriptor; idempotent on
    /// `(device_id, key)` where the key is `metadata["key"]` when present,
    /// otherwise the descriptor id.
    ///
    /// # Errors
    ///
    /// Returns a validation or storage error from the repository.
    pub async fn upsert_entity(
        &self,
        descriptor: &EntityDescriptor,
        device_id: &DeviceId,
        home_id: &HomeId,
    ) -> Result<Entity> {
        let key = descriptor.key();
        if let Some(existing) = self.store.entity_by_key(device_id, &key).await? {
            return Ok(existing);
        }

        let entity = Entity::builder()
            .id(descriptor.id.clone())
            .device_id(device_id.clone())
            .home_id(home_id.clone())
            .kind(descriptor.kind)
            .key(key)
            .name(&descriptor.name)
            .capability(descriptor.capability.clone())
            .build()?;
        self.store.insert_entity(entity).await
    }

    /// Store a credential blob; one blob per `(device_id, kind)`.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn store_credentials(
        &self,
        device_id: &DeviceId,
        kind: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        self.store
            .upsert_credential(Credential::new(device_id.clone(), kind, data))
            .await
    }

    /// Fetch a credential blob, optionally filtered by kind.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn get_credentials(
        &self,
        device_id: &DeviceId,
        kind: Option<&str>,
    ) -> Result<Option<Credential>> {
        self.store.credential(device_id, kind).await
    }

    /// Record a successful pairing: sets `paired_at` and refreshes
    /// `last_seen`.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn mark_device_paired(&self, device_id: &DeviceId) -> Result<()> {
        let ts = now();
        self.store.set_device_paired(device_id, ts).await?;
        self.store.touch_device_last_seen(device_id, ts).await
    }

    /// Refresh a device's `last_seen` timestamp.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn update_device_last_seen(&self, device_id: &DeviceId) -> Result<()> {
        self.store.touch_device_last_seen(device_id, now()).await
    }

    /// Look up a device, failing when absent.
    ///
    /// # Errors
    ///
    /// Returns [`HearthError::NotFound`] when no device with `id` exists.
    pub async fn get_device(&self, id: &DeviceId) -> Result<Device> {
        self.store
            .device_by_id(id)
            .await?
            .ok_or_else(|| NotFoundError::new("Device", id.as_str()).into())
    }

    /// Look up an entity, failing when absent.
    ///
    /// # Errors
    ///
    /// Returns [`HearthError::NotFound`] when no entity with `id` exists.
    pub async fn get_entity(&self, id: &EntityId) -> Result<Entity> {
        self.store
            .entity_by_id(id)
            .await?
            .ok_or_else(|| NotFoundError::new("Entity", id.as_str()).into())
    }

    /// Devices in a home.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn get_devices_by_home(&self, home_id: &HomeId) -> Result<Vec<Device>> {
        self.store.devices_by_home(home_id).await
    }

    /// Entities matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn get_entities(&self, filter: &EntityFilter) -> Result<Vec<Entity>> {
        self.store.entities(filter).await
    }
}

// Shared between the daemon and the router, so hand out clones behind Arc.
impl<S> Registry<S> {
    /// Wrap in an [`Arc`] for sharing across tasks.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;
    use hearth_domain::entity::EntityKind;
    use hearth_domain::error::HearthError;
    use hearth_domain::state::AttributeValue;

    fn make_registry() -> Registry<InMemoryStore> {
        Registry::new(InMemoryStore::default())
    }

    fn descriptor_with_fingerprint(address: &str) -> DeviceDescriptor {
        let mut desc = DeviceDescriptor::new("esphome-aabbcc", "Air Monitor", "esphome");
        desc.vendor = Some("Acme".into());
        desc.model = Some("AM-1".into());
        desc.address = Some(address.to_string());
        desc.fingerprint = Some("F1".into());
        desc
    }

    #[tokio::test]
    async fn should_create_home_once_per_name() {
        let registry = make_registry();

        let first = registry.get_or_create_home("Default Home", None).await.unwrap();
        let second = registry.get_or_create_home("Default Home", None).await.unwrap();

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn should_converge_to_one_device_per_fingerprint() {
        let registry = make_registry();
        let home = registry.get_or_create_home("Default Home", None).await.unwrap();

        let first = registry
            .upsert_device(&descriptor_with_fingerprint("10.0.0.1"), &home.id)
            .await
            .unwrap();

        // Same fingerprint, new address and name: must update, not insert.
        let mut changed = descriptor_with_fingerprint("10.0.0.9");
        changed.name = "Air Monitor v2".to_string();
        let second = registry.upsert_device(&changed, &home.id).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.address.as_deref(), Some("10.0.0.9"));
        assert_eq!(second.name, "Air Monitor v2");
        assert!(second.last_seen >= first.last_seen);

        let devices = registry.get_devices_by_home(&home.id).await.unwrap();
        assert_eq!(devices.len(), 1);
    }

    #[tokio::test]
    async fn should_dedup_on_address_vendor_model_without_fingerprint() {
        let registry = make_registry();
        let home = registry.get_or_create_home("Default Home", None).await.unwrap();

        let mut desc = DeviceDescriptor::new("hue-b1", "Hue Bridge", "hue");
        desc.vendor = Some("Signify".into());
        desc.model = Some("BSB002".into());
        desc.address = Some("10.0.0.2".into());

        let first = registry.upsert_device(&desc, &home.id).await.unwrap();
        let second = registry.upsert_device(&desc, &home.id).await.unwrap();

        assert_eq!(first.id, second.id);
        let devices = registry.get_devices_by_home(&home.id).await.unwrap();
        assert_eq!(devices.len(), 1);
    }

    #[tokio::test]
    async fn should_insert_new_row_when_nothing_matches() {
        let registry = make_registry();
        let home = registry.get_or_create_home("Default Home", None).await.unwrap();

        let a = DeviceDescriptor::new("d-a", "A", "esphome");
        let b = DeviceDescriptor::new("d-b", "B", "esphome");
        registry.upsert_device(&a, &home.id).await.unwrap();
        registry.upsert_device(&b, &home.id).await.unwrap();

        let devices = registry.get_devices_by_home(&home.id).await.unwrap();
        assert_eq!(devices.len(), 2);
    }

    #[tokio::test]
    async fn should_upsert_entity_idempotently_on_device_and_key() {
        let registry = make_registry();
        let home = registry.get_or_create_home("Default Home", None).await.unwrap();
        let device = registry
            .upsert_device(&descriptor_with_fingerprint("10.0.0.1"), &home.id)
            .await
            .unwrap();

        let desc = EntityDescriptor::new("esphome-aabbcc:co2", "CO2 Reading", EntityKind::Sensor);
        let first = registry
            .upsert_entity(&desc, &device.id, &home.id)
            .await
            .unwrap();
        let second = registry
            .upsert_entity(&desc, &device.id, &home.id)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let entities = registry.get_entities(&EntityFilter::default()).await.unwrap();
        assert_eq!(entities.len(), 1);
    }

    #[tokio::test]
    async fn should_use_metadata_key_for_entity_dedup() {
        let registry = make_registry();
        let home = registry.get_or_create_home("Default Home", None).await.unwrap();
        let device = registry
            .upsert_device(&descriptor_with_fingerprint("10.0.0.1"), &home.id)
            .await
            .unwrap();

        let mut desc_a =
            EntityDescriptor::new("esphome-aabbcc:co2", "CO2 Reading", EntityKind::Sensor);
        desc_a
            .metadata
            .insert("key".into(), AttributeValue::String("42".into()));

        // Different descriptor id, same driver key: still the same entity.
        let mut desc_b =
            EntityDescriptor::new("esphome-aabbcc:co2_renamed", "CO2 Reading", EntityKind::Sensor);
        desc_b
            .metadata
            .insert("key".into(), AttributeValue::String("42".into()));

        let first = registry
            .upsert_entity(&desc_a, &device.id, &home.id)
            .await
            .unwrap();
        let second = registry
            .upsert_entity(&desc_b, &device.id, &home.id)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn should_store_one_credential_per_device_and_kind() {
        let registry = make_registry();
        let device_id = DeviceId::new("d1");

        registry
            .store_credentials(&device_id, "hue", b"user-1".to_vec())
            .await
            .unwrap();
        registry
            .store_credentials(&device_id, "hue", b"user-2".to_vec())
            .await
            .unwrap();

        let cred = registry
            .get_credentials(&device_id, Some("hue"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cred.data, b"user-2");
    }

    #[tokio::test]
    async fn should_keep_credentials_of_different_kinds_apart() {
        let registry = make_registry();
        let device_id = DeviceId::new("d1");

        registry
            .store_credentials(&device_id, "hue", b"user".to_vec())
            .await
            .unwrap();
        registry
            .store_credentials(&device_id, "esphome", Vec::new())
            .await
            .unwrap();

        let hue = registry
            .get_credentials(&device_id, Some("hue"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hue.data, b"user");

        let esphome = registry
            .get_credentials(&device_id, Some("esphome"))
            .await
            .unwrap()
            .unwrap();
        assert!(esphome.data.is_empty());
    }

    #[tokio::test]
    async fn should_mark_device_paired() {
        let registry = make_registry();
        let home = registry.get_or_create_home("Default Home", None).await.unwrap();
        let device = registry
            .upsert_device(&descriptor_with_fingerprint("10.0.0.1"), &home.id)
            .await
            .unwrap();
        assert!(device.paired_at.is_none());

        registry.mark_device_paired(&device.id).await.unwrap();

        let device = registry.get_device(&device.id).await.unwrap();
        assert!(device.paired_at.is_some());
    }

    #[tokio::test]
    async fn should_return_not_found_for_missing_device_and_entity() {
        let registry = make_registry();

        let device = registry.get_device(&DeviceId::new("nope")).await;
        assert!(matches!(device, Err(HearthError::NotFound(_))));

        let entity = registry.get_entity(&EntityId::new("nope")).await;
        assert!(matches!(entity, Err(HearthError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_filter_entities_by_kind() {
        let registry = make_registry();
        let home = registry.get_or_create_home("Default Home", None).await.unwrap();
        let device = registry
            .upsert_device(&descriptor_with_fingerprint("10.0.0.1"), &home.id)
            .await
            .unwrap();

        let sensor = EntityDescriptor::new("d:co2", "CO2 Reading", EntityKind::Sensor);
        let light = EntityDescriptor::new("d:lamp", "Lamp", EntityKind::Light);
        registry
            .upsert_entity(&sensor, &device.id, &home.id)
            .await
            .unwrap();
        registry
            .upsert_entity(&light, &device.id, &home.id)
            .await
            .unwrap();

        let filter = EntityFilter {
            kind: Some(EntityKind::Light),
            ..EntityFilter::default()
        };
        let lights = registry.get_entities(&filter).await.unwrap();
        assert_eq!(lights.len(), 1);
        assert_eq!(lights[0].kind, EntityKind::Light);
    }
}
