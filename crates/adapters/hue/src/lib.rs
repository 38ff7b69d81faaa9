//! # hearth-adapter-hue
//!
//! Philips Hue driver: REST client against one or more bridges. Pairing
//! creates an API user (link button), lights/groups/scenes become entities,
//! and subscriptions are backed by a short-cadence poll of the lights
//! resource (the v1 bridge has no push channel).
//!
//! ## Dependency rule
//!
//! Depends on `hearth-app` (driver port) and `hearth-domain` only.

mod client;
mod config;
mod error;
mod payload;

pub use config::{HueBridgeConfig, HueConfig};
pub use error::HueError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use hearth_app::ports::{Driver, StateCallback, Subscription};
use hearth_domain::command::{CommandRequest, InvokeResult};
use hearth_domain::device::DeviceDescriptor;
use hearth_domain::entity::{EntityDescriptor, EntityKind};
use hearth_domain::error::{HearthError, Result};
use hearth_domain::id::{DeviceId, EntityId};
use hearth_domain::state::{AttributeValue, StateMap, StateUpdate};

use client::HueClient;
use payload::{BridgeConfig, Light, StateBody};

/// Protocol tag the driver registers under.
pub const PROTOCOL: &str = "hue";

const DEVICETYPE: &str = "hearth#hub";

type CallbackTable = StdMutex<HashMap<EntityId, StateCallback>>;

struct Session {
    client: HueClient,
    username: String,
    bridge: BridgeConfig,
    lights: StdMutex<HashMap<String, Light>>,
    poll_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Session {
    fn stop_polling(&self) {
        if let Some(handle) = self
            .poll_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

struct DriverState {
    config: HueConfig,
    /// API users per bridge, seeded from config and extended by `pair`.
    usernames: StdMutex<HashMap<DeviceId, String>>,
    sessions: Mutex<HashMap<DeviceId, Arc<Session>>>,
    callbacks: Arc<CallbackTable>,
    initialized: AtomicBool,
}

/// The Hue driver instance.
pub struct HueDriver {
    state: Arc<DriverState>,
}

impl HueDriver {
    #[must_use]
    pub fn new(config: HueConfig) -> Self {
        Self {
            state: Arc::new(DriverState {
                config,
                usernames: StdMutex::new(HashMap::new()),
                sessions: Mutex::new(HashMap::new()),
                callbacks: Arc::new(StdMutex::new(HashMap::new())),
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Stable device id for a bridge address.
    #[must_use]
    pub fn device_id_for(address: &str) -> DeviceId {
        DeviceId::new(format!("hue-{}", address.replace(['.', ':'], "-")))
    }

    fn bridge_config(&self, device_id: &DeviceId) -> Option<HueBridgeConfig> {
        self.state
            .config
            .bridges
            .iter()
            .find(|bridge| &Self::device_id_for(&bridge.address) == device_id)
            .cloned()
    }

    fn username_for(&self, device_id: &DeviceId) -> Option<String> {
        self.state
            .usernames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device_id)
            .cloned()
    }
}

/// Normalized state shape for a light.
fn light_state_map(state: &payload::LightState) -> StateMap {
    let mut map = StateMap::new();
    map.insert("state".into(), AttributeValue::Bool(state.on));
    map.insert(
        "brightness".into(),
        AttributeValue::Float(payload::bri_to_brightness(state.bri)),
    );
    map.insert("reachable".into(), AttributeValue::Bool(state.reachable));
    map
}

async fn poll_loop(
    session: Weak<Session>,
    device_id: DeviceId,
    callbacks: Arc<CallbackTable>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(session) = session.upgrade() else {
            return;
        };

        let lights = match session.client.lights(&session.username).await {
            Ok(lights) => lights,
            Err(err) => {
                tracing::debug!(device = %device_id, %err, "light poll failed");
                continue;
            }
        };

        for (light_id, light) in &lights {
            let changed = {
                let cache = session
                    .lights
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                cache
                    .get(light_id)
                    .is_none_or(|known| known.state != light.state)
            };
            if !changed {
                continue;
            }

            let entity_id = EntityId::new(format!("{device_id}:light-{light_id}"));
            let callback = {
                let callbacks = callbacks.lock().unwrap_or_else(PoisonError::into_inner);
                callbacks.get(&entity_id).cloned()
            };
            if let Some(callback) = callback {
                callback(StateUpdate {
                    entity_id,
                    state: light_state_map(&light.state),
                });
            }
        }

        *session
            .lights
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = lights;
    }
}

#[async_trait]
impl Driver for HueDriver {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    async fn initialize(&self) -> Result<()> {
        {
            let mut usernames = self
                .state
                .usernames
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for bridge in &self.state.config.bridges {
                if let Some(username) = &bridge.username {
                    usernames.insert(Self::device_id_for(&bridge.address), username.clone());
                }
            }
        }
        self.state.initialized.store(true, Ordering::SeqCst);
        tracing::info!(
            bridges = self.state.config.bridges.len(),
            "hue driver ready"
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.state.initialized.store(false, Ordering::SeqCst);
        let sessions: Vec<(DeviceId, Arc<Session>)> =
            self.state.sessions.lock().await.drain().collect();
        for (device_id, session) in sessions {
            tracing::debug!(device = %device_id, "closing bridge session");
            session.stop_polling();
        }
        self.state
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    async fn discover(&self) -> Result<Vec<DeviceDescriptor>> {
        let mut descriptors = Vec::new();
        let sessions = self.state.sessions.lock().await;

        for bridge in &self.state.config.bridges {
            let device_id = Self::device_id_for(&bridge.address);
            let mut descriptor =
                DeviceDescriptor::new(device_id.clone(), "Hue Bridge", PROTOCOL);
            descriptor.address = Some(bridge.address.clone());
            descriptor.vendor = Some("Signify".to_string());

            if let Some(session) = sessions.get(&device_id) {
                if !session.bridge.name.is_empty() {
                    descriptor.name = session.bridge.name.clone();
                }
                if !session.bridge.bridgeid.is_empty() {
                    descriptor.fingerprint = Some(session.bridge.bridgeid.clone());
                }
                if !session.bridge.modelid.is_empty() {
                    descriptor.model = Some(session.bridge.modelid.clone());
                }
            }
            descriptors.push(descriptor);
        }
        Ok(descriptors)
    }

    async fn pair(&self, device_id: &DeviceId, credentials: Option<&[u8]>) -> Result<Vec<u8>> {
        // An existing user means the bridge is already paired.
        if let Some(existing) = credentials.filter(|c| !c.is_empty()) {
            let username = String::from_utf8_lossy(existing).into_owned();
            self.state
                .usernames
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(device_id.clone(), username);
            return Ok(existing.to_vec());
        }

        let bridge = self
            .bridge_config(device_id)
            .ok_or_else(|| HueError::UnknownBridge(device_id.to_string()))?;
        let client = HueClient::new(&bridge.address).map_err(HearthError::from)?;
        let username = client
            .create_user(DEVICETYPE)
            .await
            .map_err(HearthError::from)?;
        tracing::info!(device = %device_id, "created bridge API user");

        self.state
            .usernames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_id.clone(), username.clone());
        Ok(username.into_bytes())
    }

    async fn connect(&self, device_id: &DeviceId, address: &str) -> Result<()> {
        {
            let sessions = self.state.sessions.lock().await;
            if sessions.contains_key(device_id) {
                return Ok(());
            }
        }

        let username = self
            .username_for(device_id)
            .ok_or_else(|| HueError::NotPaired(address.to_string()))?;

        let client = HueClient::new(address).map_err(HearthError::from)?;
        let bridge = client.config(&username).await.map_err(HearthError::from)?;
        tracing::info!(device = %device_id, bridge = %bridge.name, "bridge online");

        let session = Arc::new(Session {
            client,
            username,
            bridge,
            lights: StdMutex::new(HashMap::new()),
            poll_task: StdMutex::new(None),
        });

        let handle = tokio::spawn(poll_loop(
            Arc::downgrade(&session),
            device_id.clone(),
            Arc::clone(&self.state.callbacks),
            self.state.config.poll_interval(),
        ));
        *session
            .poll_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        self.state
            .sessions
            .lock()
            .await
            .insert(device_id.clone(), session);
        Ok(())
    }

    async fn disconnect(&self, device_id: &DeviceId) -> Result<()> {
        if let Some(session) = self.state.sessions.lock().await.remove(device_id) {
            session.stop_polling();
        }
        Ok(())
    }

    async fn device_info(&self, device_id: &DeviceId) -> Result<Option<DeviceDescriptor>> {
        let sessions = self.state.sessions.lock().await;
        let Some(session) = sessions.get(device_id) else {
            return Ok(None);
        };

        let mut descriptor =
            DeviceDescriptor::new(device_id.clone(), session.bridge.name.clone(), PROTOCOL);
        descriptor.vendor = Some("Signify".to_string());
        descriptor.fingerprint =
            (!session.bridge.bridgeid.is_empty()).then(|| session.bridge.bridgeid.clone());
        descriptor.model =
            (!session.bridge.modelid.is_empty()).then(|| session.bridge.modelid.clone());
        Ok(Some(descriptor))
    }

    async fn entities(&self, device_id: &DeviceId) -> Result<Vec<EntityDescriptor>> {
        let session = {
            let sessions = self.state.sessions.lock().await;
            sessions
                .get(device_id)
                .cloned()
                .ok_or_else(|| HueError::NotPaired(device_id.to_string()))?
        };

        let mut descriptors = Vec::new();

        let lights = session
            .client
            .lights(&session.username)
            .await
            .map_err(HearthError::from)?;
        for (light_id, light) in &lights {
            let mut descriptor = EntityDescriptor::new(
                format!("{device_id}:light-{light_id}"),
                light.name.clone(),
                EntityKind::Light,
            );
            descriptor.capability = descriptor
                .capability
                .with_attribute("supports_brightness", true)
                .with_attribute("hue_id", light_id.as_str());
            if !light.uniqueid.is_empty() {
                // The Zigbee unique id survives renumbering.
                descriptor
                    .metadata
                    .insert("key".into(), AttributeValue::String(light.uniqueid.clone()));
            }
            descriptors.push(descriptor);
        }
        *session
            .lights
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = lights;

        let groups = session
            .client
            .groups(&session.username)
            .await
            .map_err(HearthError::from)?;
        for (group_id, group) in groups {
            let mut descriptor = EntityDescriptor::new(
                format!("{device_id}:group-{group_id}"),
                group.name,
                EntityKind::Light,
            );
            descriptor.capability = descriptor
                .capability
                .with_attribute("group", true)
                .with_attribute("light_count", group.lights.len() as i64);
            descriptors.push(descriptor);
        }

        let scenes = session
            .client
            .scenes(&session.username)
            .await
            .map_err(HearthError::from)?;
        for (scene_id, scene) in scenes {
            let mut descriptor = EntityDescriptor::new(
                format!("{device_id}:scene-{scene_id}"),
                scene.name,
                EntityKind::Button,
            );
            descriptor.capability = descriptor
                .capability
                .with_attribute("scene_id", scene_id.as_str());
            descriptors.push(descriptor);
        }

        Ok(descriptors)
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
        let Some((device_part, object)) = entity_id.as_str().rsplit_once(':') else {
            return Ok(InvokeResult::failure("Unknown entity"));
        };
        let device_id = DeviceId::new(device_part);

        let session = {
            let sessions = self.state.sessions.lock().await;
            sessions
                .get(&device_id)
                .cloned()
                .ok_or_else(|| HueError::NotPaired(device_id.to_string()))?
        };

        let outcome = if let Some(light_id) = object.strip_prefix("light-") {
            let Some(body) = command_body(&request.capability, &request.value) else {
                return Ok(InvokeResult::failure("Unsupported capability"));
            };
            session
                .client
                .set_light_state(&session.username, light_id, &body)
                .await
        } else if let Some(group_id) = object.strip_prefix("group-") {
            let Some(body) = command_body(&request.capability, &request.value) else {
                return Ok(InvokeResult::failure("Unsupported capability"));
            };
            session
                .client
                .set_group_action(&session.username, group_id, &body)
                .await
        } else if let Some(scene_id) = object.strip_prefix("scene-") {
            // Scene recall goes through group 0 (all lights).
            let body = StateBody {
                scene: Some(scene_id.to_string()),
                ..StateBody::default()
            };
            session
                .client
                .set_group_action(&session.username, "0", &body)
                .await
        } else {
            return Ok(InvokeResult::failure("Unsupported entity type"));
        };

        match outcome {
            Ok(()) => Ok(InvokeResult::success()),
            Err(err @ HueError::Api { .. }) => Ok(InvokeResult::failure(err.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    async fn healthy(&self) -> bool {
        self.state.initialized.load(Ordering::SeqCst)
    }
}

/// Translate a normalized light/group command into a request body. `None`
/// means the capability is not supported.
fn command_body(capability: &str, value: &AttributeValue) -> Option<StateBody> {
    match capability {
        "on_off" => Some(StateBody {
            on: value.as_bool(),
            ..StateBody::default()
        })
        .filter(|body| body.on.is_some()),
        "brightness" => value.as_f64().map(|percent| StateBody {
            on: Some(true),
            bri: Some(payload::brightness_to_bri(percent)),
            ..StateBody::default()
        }),
        "color_rgb" => {
            let AttributeValue::Json(rgb) = value else {
                return None;
            };
            let component = |channel: &str| rgb.get(channel).and_then(serde_json::Value::as_f64);
            let (r, g, b) = (component("r")?, component("g")?, component("b")?);
            let (hue, sat) = payload::rgb_to_hue_sat(r, g, b);
            Some(StateBody {
                on: Some(true),
                hue: Some(hue),
                sat: Some(sat),
                ..StateBody::default()
            })
        }
        _ => None,
    }
}
