//! Driver port — the capability set every protocol adapter must satisfy.
//!
//! A driver bridges one concrete ecosystem (ESPHome, Hue, …) into the hub.
//! The daemon looks drivers up dynamically by protocol tag, so the contract
//! is object-safe and lives behind `Arc<dyn Driver>`.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use hearth_domain::command::{CommandRequest, InvokeResult};
use hearth_domain::device::DeviceDescriptor;
use hearth_domain::entity::EntityDescriptor;
use hearth_domain::error::Result;
use hearth_domain::id::{DeviceId, EntityId};
use hearth_domain::state::StateUpdate;

/// Callback invoked on every state update for a subscribed entity.
///
/// Callbacks must not block: drivers invoke them from their own read loops.
/// Publishing to the event bus is the intended body.
pub type StateCallback = Arc<dyn Fn(StateUpdate) + Send + Sync>;

/// A pluggable protocol adapter.
///
/// Errors from any method are surfaced to the caller; a driver must never
/// panic the host process. `initialize` and `shutdown` are idempotent.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Protocol tag this driver answers to (e.g. `"esphome"`). Unique
    /// across the registry.
    fn protocol(&self) -> &'static str;

    /// Idempotent start-up hook; called exactly once by the loader before
    /// the driver is exposed through the registry.
    async fn initialize(&self) -> Result<()>;

    /// Idempotent tear-down hook; releases every connection the driver owns.
    async fn shutdown(&self) -> Result<()>;

    /// Produce the device descriptors currently visible to this driver.
    /// Finite per call and callable repeatedly.
    async fn discover(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Optional credential exchange. Self-pairing protocols keep the
    /// default no-op and return an empty blob.
    async fn pair(&self, device_id: &DeviceId, credentials: Option<&[u8]>) -> Result<Vec<u8>> {
        let _ = (device_id, credentials);
        Ok(Vec::new())
    }

    /// Establish a live session with the device at `address`.
    async fn connect(&self, device_id: &DeviceId, address: &str) -> Result<()>;

    /// Tear down the live session, if any.
    async fn disconnect(&self, device_id: &DeviceId) -> Result<()>;

    /// Current snapshot of device metadata, or `None` when the driver has
    /// no live knowledge of the device.
    async fn device_info(&self, device_id: &DeviceId) -> Result<Option<DeviceDescriptor>>;

    /// Entity descriptors currently known for this device.
    async fn entities(&self, device_id: &DeviceId) -> Result<Vec<EntityDescriptor>>;

    /// Attach `callback` to every subsequent state update for `entity_id`.
    async fn subscribe(&self, entity_id: &EntityId, callback: StateCallback)
    -> Result<Subscription>;

    /// Apply a normalized command.
    async fn invoke(&self, entity_id: &EntityId, request: &CommandRequest)
    -> Result<InvokeResult>;

    /// Liveness probe used by the registry's health report.
    async fn healthy(&self) -> bool {
        true
    }
}

/// Idempotent unsubscribe handle returned by [`Driver::subscribe`].
///
/// The first call to [`unsubscribe`](Self::unsubscribe) runs the release
/// closure; later calls are no-ops. Dropping the handle does *not*
/// unsubscribe — the daemon releases every handle explicitly on stop.
pub struct Subscription {
    release: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    /// Wrap a release closure.
    #[must_use]
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// A handle that releases nothing (for drivers whose subscriptions die
    /// with the connection).
    #[must_use]
    pub fn noop() -> Self {
        Self {
            release: Mutex::new(None),
        }
    }

    /// Release the subscription. Safe to call more than once.
    pub fn unsubscribe(&self) {
        let release = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = release {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
