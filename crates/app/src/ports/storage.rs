//! Storage ports — repository traits for persistence.
//!
//! The persistence layer is assumed internally thread-safe and
//! transactional; the core adds no locking around it. Method names are
//! prefixed per concern so a single adapter struct can implement every
//! trait without collisions.

use std::future::Future;

use hearth_domain::credential::Credential;
use hearth_domain::device::Device;
use hearth_domain::entity::{Entity, EntityKind};
use hearth_domain::error::HearthError;
use hearth_domain::home::Home;
use hearth_domain::id::{DeviceId, EntityId, HomeId};
use hearth_domain::state::EntityState;
use hearth_domain::telemetry::{TelemetryPoint, TelemetryQuery};
use hearth_domain::time::Timestamp;

/// CRUD for homes.
pub trait HomeRepository: Send + Sync {
    fn insert_home(&self, home: Home)
    -> impl Future<Output = Result<Home, HearthError>> + Send;

    fn home_by_id(
        &self,
        id: &HomeId,
    ) -> impl Future<Output = Result<Option<Home>, HearthError>> + Send;

    fn home_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Option<Home>, HearthError>> + Send;
}

/// CRUD plus dedup lookups for devices.
pub trait DeviceRepository: Send + Sync {
    fn insert_device(
        &self,
        device: Device,
    ) -> impl Future<Output = Result<Device, HearthError>> + Send;

    fn update_device(
        &self,
        device: Device,
    ) -> impl Future<Output = Result<Device, HearthError>> + Send;

    fn device_by_id(
        &self,
        id: &DeviceId,
    ) -> impl Future<Output = Result<Option<Device>, HearthError>> + Send;

    /// Dedup rule 1: match on `(home_id, fingerprint)`.
    fn device_by_fingerprint(
        &self,
        home_id: &HomeId,
        fingerprint: &str,
    ) -> impl Future<Output = Result<Option<Device>, HearthError>> + Send;

    /// Dedup rule 2: match on `(home_id, address, vendor, model)`.
    fn device_by_address(
        &self,
        home_id: &HomeId,
        address: &str,
        vendor: Option<&str>,
        model: Option<&str>,
    ) -> impl Future<Output = Result<Option<Device>, HearthError>> + Send;

    fn devices_by_home(
        &self,
        home_id: &HomeId,
    ) -> impl Future<Output = Result<Vec<Device>, HearthError>> + Send;

    fn set_device_paired(
        &self,
        id: &DeviceId,
        paired_at: Timestamp,
    ) -> impl Future<Output = Result<(), HearthError>> + Send;

    fn touch_device_last_seen(
        &self,
        id: &DeviceId,
        last_seen: Timestamp,
    ) -> impl Future<Output = Result<(), HearthError>> + Send;
}

/// Filters for the entity read path.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    pub home_id: Option<HomeId>,
    pub device_id: Option<DeviceId>,
    pub kind: Option<EntityKind>,
}

/// CRUD plus `(device_id, key)` dedup for entities.
pub trait EntityRepository: Send + Sync {
    fn insert_entity(
        &self,
        entity: Entity,
    ) -> impl Future<Output = Result<Entity, HearthError>> + Send;

    fn entity_by_id(
        &self,
        id: &EntityId,
    ) -> impl Future<Output = Result<Option<Entity>, HearthError>> + Send;

    fn entity_by_key(
        &self,
        device_id: &DeviceId,
        key: &str,
    ) -> impl Future<Output = Result<Option<Entity>, HearthError>> + Send;

    fn entities(
        &self,
        filter: &EntityFilter,
    ) -> impl Future<Output = Result<Vec<Entity>, HearthError>> + Send;
}

/// One blob per `(device_id, kind)`.
pub trait CredentialRepository: Send + Sync {
    fn upsert_credential(
        &self,
        credential: Credential,
    ) -> impl Future<Output = Result<(), HearthError>> + Send;

    /// Fetch the blob for a device; `kind = None` returns whichever blob is
    /// current for the device.
    fn credential(
        &self,
        device_id: &DeviceId,
        kind: Option<&str>,
    ) -> impl Future<Output = Result<Option<Credential>, HearthError>> + Send;
}

/// Last-write-wins entity state snapshots.
pub trait EntityStateRepository: Send + Sync {
    /// Upsert keyed on `entity_id`. The stored `updated_at` must never move
    /// backwards: an upsert carrying an older timestamp is dropped.
    fn upsert_entity_state(
        &self,
        state: EntityState,
    ) -> impl Future<Output = Result<(), HearthError>> + Send;

    fn entity_state(
        &self,
        entity_id: &EntityId,
    ) -> impl Future<Output = Result<Option<EntityState>, HearthError>> + Send;
}

/// Append-only telemetry time-series.
pub trait TelemetryRepository: Send + Sync {
    fn insert_telemetry_batch(
        &self,
        points: &[TelemetryPoint],
    ) -> impl Future<Output = Result<(), HearthError>> + Send;

    fn telemetry_by_entity(
        &self,
        entity_id: &EntityId,
        query: &TelemetryQuery,
    ) -> impl Future<Output = Result<Vec<TelemetryPoint>, HearthError>> + Send;

    fn telemetry_by_home(
        &self,
        home_id: &HomeId,
        query: &TelemetryQuery,
    ) -> impl Future<Output = Result<Vec<TelemetryPoint>, HearthError>> + Send;

    /// Retention sweep: delete points older than `cutoff`, returning the
    /// number of rows removed.
    fn purge_telemetry_before(
        &self,
        cutoff: Timestamp,
    ) -> impl Future<Output = Result<u64, HearthError>> + Send;
}

/// Umbrella bound for adapters that provide the whole persistence surface.
pub trait HubStore:
    HomeRepository
    + DeviceRepository
    + EntityRepository
    + CredentialRepository
    + EntityStateRepository
    + TelemetryRepository
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> HubStore for T where
    T: HomeRepository
        + DeviceRepository
        + EntityRepository
        + CredentialRepository
        + EntityStateRepository
        + TelemetryRepository
        + Clone
        + Send
        + Sync
        + 'static
{
}
