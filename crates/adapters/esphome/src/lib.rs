//! # hearth-adapter-esphome
//!
//! Driver for ESPHome's native API: a binary framed protocol over one TCP
//! connection per device (default port 6053). The driver owns its
//! connection table; nothing about a device session is process-global.
//!
//! Discovery is host-list driven (the mDNS browser is an external
//! collaborator): each configured host becomes one device descriptor, with
//! the device MAC as fingerprint once a session has been established.
//!
//! ## Dependency rule
//!
//! Depends on `hearth-app` (driver port) and `hearth-domain` only.

mod command;
mod config;
mod connection;
mod entities;
mod error;
mod frame;
mod proto;
mod wire;

pub use config::EspHomeConfig;
pub use error::EspHomeError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex;

use hearth_app::ports::{Driver, StateCallback, Subscription};
use hearth_domain::command::{CommandRequest, InvokeResult};
use hearth_domain::device::DeviceDescriptor;
use hearth_domain::entity::EntityDescriptor;
use hearth_domain::error::Result;
use hearth_domain::id::{DeviceId, EntityId};

use connection::{CallbackTable, ConnectOptions, Connection};

/// Protocol tag the driver registers under.
pub const PROTOCOL: &str = "esphome";

const CLIENT_INFO: &str = "hearth hub";

struct DriverState {
    config: EspHomeConfig,
    connections: Mutex<HashMap<DeviceId, Connection>>,
    callbacks: Arc<CallbackTable>,
    initialized: AtomicBool,
}

impl DriverState {
    fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            password: self.config.password.clone(),
            connect_timeout: self.config.connect_timeout,
            ping_interval: self.config.ping_interval,
            forward_logs: self.config.forward_logs,
            client_info: CLIENT_INFO.to_string(),
        }
    }

    /// Establish (or refresh) the session for one device.
    async fn connect_device(
        state: &Arc<Self>,
        device_id: &DeviceId,
        address: &str,
    ) -> Result<()> {
        {
            let mut connections = state.connections.lock().await;
            match connections.get(device_id) {
                Some(existing) if !existing.is_closed() => return Ok(()),
                Some(_) => {
                    connections.remove(device_id);
                }
                None => {}
            }
        }

        let (host, port) = state.config.host_port(address);
        let on_close = state.config.reconnect.then(|| {
            let weak = Arc::downgrade(state);
            let device_id = device_id.clone();
            let address = address.to_string();
            Box::new(move || {
                tokio::spawn(DriverState::reconnect_later(weak, device_id, address));
            }) as Box<dyn FnOnce() + Send>
        });

        let connection = Connection::establish(
            device_id.clone(),
            host,
            port,
            state.connect_options(),
            Arc::clone(&state.callbacks),
            on_close,
        )
        .await
        .map_err(hearth_domain::error::HearthError::from)?;

        state
            .connections
            .lock()
            .await
            .insert(device_id.clone(), connection);
        Ok(())
    }

    fn reconnect_later(
        state: Weak<Self>,
        device_id: DeviceId,
        address: String,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            let delay = match state.upgrade() {
                Some(strong) => strong.config.reconnect_interval,
                None => return,
            };
            tokio::time::sleep(delay).await;

            let Some(strong) = state.upgrade() else {
                return;
            };
            if !strong.initialized.load(Ordering::SeqCst) {
                return;
            }

            tracing::info!(device = %device_id, "reconnecting");
            if let Err(err) = Self::connect_device(&strong, &device_id, &address).await {
                tracing::warn!(device = %device_id, %err, "reconnect failed, rescheduling");
                tokio::spawn(Self::reconnect_later(
                    Arc::downgrade(&strong),
                    device_id,
                    address,
                ));
            }
        })
    }
}

/// The ESPHome driver instance; connection state lives here, not in any
/// process-wide singleton.
pub struct EspHomeDriver {
    state: Arc<DriverState>,
}

impl EspHomeDriver {
    #[must_use]
    pub fn new(config: EspHomeConfig) -> Self {
        Self {
            state: Arc::new(DriverState {
                config,
                connections: Mutex::new(HashMap::new()),
                callbacks: Arc::new(StdMutex::new(HashMap::new())),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Stable device id for a configured host entry.
    #[must_use]
    pub fn device_id_for(host: &str) -> DeviceId {
        DeviceId::new(format!("esphome-{}", host.replace(['.', ':'], "-")))
    }

    async fn descriptor_for(&self, host: &str) -> DeviceDescriptor {
        let device_id = Self::device_id_for(host);
        let mut descriptor = DeviceDescriptor::new(device_id.clone(), host, PROTOCOL);
        descriptor.address = Some(host.to_string());
        descriptor.vendor = Some("ESPHome".to_string());

        // A live session knows more than the config does.
        let connections = self.state.connections.lock().await;
        if let Some(info) = connections
            .get(&device_id)
            .filter(|conn| !conn.is_closed())
            .and_then(Connection::device_info)
        {
            if !info.name.is_empty() {
                descriptor.name = info.name;
            }
            if !info.mac_address.is_empty() {
                descriptor.fingerprint = Some(info.mac_address);
            }
            if !info.model.is_empty() {
                descriptor.model = Some(info.model);
            }
            if !info.manufacturer.is_empty() {
                descriptor.vendor = Some(info.manufacturer);
            }
        }
        descriptor
    }
}

#[async_trait]
impl Driver for EspHomeDriver {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    async fn initialize(&self) -> Result<()> {
        self.state.initialized.store(true, Ordering::SeqCst);
        tracing::info!(hosts = self.state.config.hosts.len(), "esphome driver ready");
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.state.initialized.store(false, Ordering::SeqCst);

        let connections: Vec<(DeviceId, Connection)> =
            self.state.connections.lock().await.drain().collect();
        for (device_id, connection) in connections {
            tracing::debug!(device = %device_id, "closing connection");
            connection.shutdown().await;
        }
        self.state
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    async fn discover(&self) -> Result<Vec<DeviceDescriptor>> {
        let hosts = self.state.config.hosts.clone();
        let mut descriptors = Vec::with_capacity(hosts.len());
        for host in &hosts {
            descriptors.push(self.descriptor_for(host).await);
        }
        Ok(descriptors)
    }

    async fn connect(&self, device_id: &DeviceId, address: &str) -> Result<()> {
        DriverState::connect_device(&self.state, device_id, address).await
    }

    async fn disconnect(&self, device_id: &DeviceId) -> Result<()> {
        if let Some(connection) = self.state.connections.lock().await.remove(device_id) {
            connection.shutdown().await;
        }
        Ok(())
    }

    async fn device_info(&self, device_id: &DeviceId) -> Result<Option<DeviceDescriptor>> {
        let connections = self.state.connections.lock().await;
        let Some(connection) = connections.get(device_id).filter(|c| !c.is_closed()) else {
            return Ok(None);
        };
        let Some(info) = connection.device_info() else {
            return Ok(None);
        };

        let mut descriptor =
            DeviceDescriptor::new(device_id.clone(), info.name.clone(), PROTOCOL);
        descriptor.fingerprint =
            (!info.mac_address.is_empty()).then(|| info.mac_address.clone());
        descriptor.model = (!info.model.is_empty()).then(|| info.model.clone());
        descriptor.vendor = Some(if info.manufacturer.is_empty() {
            "ESPHome".to_string()
        } else {
            info.manufacturer.clone()
        });
        Ok(Some(descriptor))
    }

    async fn entities(&self, device_id: &DeviceId) -> Result<Vec<EntityDescriptor>> {
        let connections = self.state.connections.lock().await;
        let connection = connections
            .get(device_id)
            .filter(|c| !c.is_closed())
            .ok_or_else(|| EspHomeError::NotConnected(device_id.to_string()))?;

        Ok(connection
            .entities()
            .iter()
            .map(|entity| entity.descriptor(device_id))
            .collect())
    }

    async fn subscribe(
        &self,
        entity_id: &EntityId,
        callback: StateCallback,
    ) -> Result<Subscription> {
        self.state
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entity_id.clone(), callback);

        let callbacks = Arc::downgrade(&self.state.callbacks);
        let entity_id = entity_id.clone();
        Ok(Subscription::new(move || {
            if let Some(callbacks) = callbacks.upgrade() {
                callbacks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&entity_id);
            }
        }))
    }

    async fn invoke(
        &self,
        entity_id: &EntityId,
        request: &CommandRequest,
    ) -> Result<InvokeResult> {
        let Some((device_part, object_id)) = entity_id.as_str().rsplit_once(':') else {
            return Ok(InvokeResult::failure("Unknown entity"));
        };
        let device_id = DeviceId::new(device_part);

        let frame = {
            let connections = self.state.connections.lock().await;
            let connection = connections
                .get(&device_id)
                .filter(|c| !c.is_closed())
                .ok_or_else(|| EspHomeError::NotConnected(device_id.to_string()))?;

            let Some(entity) = connection.entity_by_object_id(object_id) else {
                return Ok(InvokeResult::failure("Unknown entity"));
            };

            match command::translate(&entity, request) {
                Ok(frame) => frame,
                // Nothing reaches the wire for untranslatable input.
                Err(err) => return Ok(InvokeResult::failure(err.to_string())),
            }
        };

        let connections = self.state.connections.lock().await;
        let connection = connections
            .get(&device_id)
            .filter(|c| !c.is_closed())
            .ok_or_else(|| EspHomeError::NotConnected(device_id.to_string()))?;
        connection
            .send(&frame)
            .await
            .map_err(hearth_domain::error::HearthError::from)?;
        Ok(InvokeResult::success())
    }

    async fn healthy(&self) -> bool {
        self.state.initialized.load(Ordering::SeqCst)
    }
}
