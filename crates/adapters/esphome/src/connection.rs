//! Per-device connection: handshake, keep-alive, and frame routing.
//!
//! One TCP connection per device. The handshake walks
//! TcpConnecting → Hello → Authenticating → Live with a hard deadline on
//! each phase; authentication rejection tears the socket down before any
//! ping is ever sent. While live, a reader task routes inbound frames
//! (request/response correlation first, then entity enumeration, then state
//! dispatch) and a ping task enforces the missed-keep-alive policy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;

use hearth_app::ports::StateCallback;
use hearth_domain::id::{DeviceId, EntityId};
use hearth_domain::state::{AttributeValue, StateUpdate};

use crate::entities::{self, EspHomeEntity};
use crate::error::EspHomeError;
use crate::frame::{Frame, FrameDecoder};
use crate::proto;

/// Driver-level subscriber table shared by every connection.
pub(crate) type CallbackTable = StdMutex<HashMap<EntityId, StateCallback>>;

/// Missed keep-alives before the connection is declared dead.
const MAX_MISSED_PINGS: u32 = 3;

/// Grace period for the device to finish entity enumeration.
const LIST_ENTITIES_DEADLINE: Duration = Duration::from_secs(10);

/// Connection tuning derived from the driver config.
#[derive(Debug, Clone)]
pub(crate) struct ConnectOptions {
    pub password: String,
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
    pub forward_logs: bool,
    pub client_info: String,
}

pub(crate) struct Shared {
    device_id: DeviceId,
    writer: Mutex<OwnedWriteHalf>,
    pending: StdMutex<HashMap<u32, oneshot::Sender<Vec<u8>>>>,
    entities: StdMutex<HashMap<u32, EspHomeEntity>>,
    entities_done: watch::Sender<bool>,
    device_info: StdMutex<Option<proto::DeviceInfoResponse>>,
    callbacks: Arc<CallbackTable>,
    missed_pings: AtomicU32,
    closed: AtomicBool,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    /// Fired once when the connection dies unexpectedly (reconnect hook).
    on_close: StdMutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Shared {
    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u32, oneshot::Sender<Vec<u8>>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send_frame(&self, frame: &Frame) -> Result<(), EspHomeError> {
        let bytes = frame.encode();
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        Ok(())
    }

    /// Send `request` and await the payload of the matching response type.
    async fn round_trip(
        &self,
        request: Frame,
        response_type: u32,
        what: &'static str,
        deadline: Duration,
    ) -> Result<Vec<u8>, EspHomeError> {
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(response_type, tx);
        self.send_frame(&request).await?;

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(EspHomeError::Protocol(format!(
                "connection closed waiting for {what}"
            ))),
            Err(_) => {
                self.lock_pending().remove(&response_type);
                Err(EspHomeError::Timeout(what))
            }
        }
    }

    /// Tear the connection down. `expected` suppresses the reconnect hook.
    async fn close(&self, expected: bool) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if !expected {
            let hook = self
                .on_close
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(hook) = hook {
                hook();
            }
        }

        // Wake every waiter with a closed-connection error.
        self.lock_pending().clear();

        let _ = self.writer.lock().await.shutdown().await;
        let handles: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            handle.abort();
        }
    }
}

/// A live (or once-live) device session.
pub(crate) struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Run the full connect sequence against `host:port`.
    ///
    /// On success the connection is live: keep-alive running, entities
    /// enumerated, state subscription active.
    pub(crate) async fn establish(
        device_id: DeviceId,
        host: &str,
        port: u16,
        options: ConnectOptions,
        callbacks: Arc<CallbackTable>,
        on_close: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<Self, EspHomeError> {
        // TcpConnecting
        let stream = tokio::time::timeout(
            options.connect_timeout,
            TcpStream::connect((host, port)),
        )
        .await
        .map_err(|_| EspHomeError::Timeout("tcp connect"))??;
        let (read_half, write_half) = stream.into_split();

        let shared = Arc::new(Shared {
            device_id: device_id.clone(),
            writer: Mutex::new(write_half),
            pending: StdMutex::new(HashMap::new()),
            entities: StdMutex::new(HashMap::new()),
            entities_done: watch::channel(false).0,
            device_info: StdMutex::new(None),
            callbacks,
            missed_pings: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            tasks: StdMutex::new(Vec::new()),
            on_close: StdMutex::new(on_close),
        });

        let reader_task = tokio::spawn(read_loop(Arc::clone(&shared), read_half));
        shared
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(reader_task);

        let connection = Self { shared };
        if let Err(err) = connection.handshake(&options).await {
            connection.shared.close(true).await;
            return Err(err);
        }
        Ok(connection)
    }

    /// Hello → Authenticating → Live.
    async fn handshake(&self, options: &ConnectOptions) -> Result<(), EspHomeError> {
        let shared = &self.shared;

        // Hello
        let hello = proto::HelloRequest {
            client_info: options.client_info.clone(),
            api_version_major: 1,
            api_version_minor: 0,
        };
        let payload = shared
            .round_trip(
                Frame::new(proto::HelloRequest::TYPE, hello.encode()),
                proto::HelloResponse::TYPE,
                "HelloResponse",
                options.connect_timeout,
            )
            .await?;
        let hello = proto::HelloResponse::decode(&payload)
            .map_err(|err| EspHomeError::Protocol(err.to_string()))?;
        tracing::debug!(
            device = %shared.device_id,
            server = %hello.server_info,
            "hello exchange complete"
        );

        // Authenticating
        let auth = proto::AuthenticationRequest {
            password: options.password.clone(),
        };
        let payload = shared
            .round_trip(
                Frame::new(proto::AuthenticationRequest::TYPE, auth.encode()),
                proto::AuthenticationResponse::TYPE,
                "AuthenticationResponse",
                options.connect_timeout,
            )
            .await?;
        let auth = proto::AuthenticationResponse::decode(&payload)
            .map_err(|err| EspHomeError::Protocol(err.to_string()))?;
        if auth.invalid_password {
            return Err(EspHomeError::AuthFailed);
        }

        // Live: keep-alive starts only after authentication succeeded.
        let ping_task = tokio::spawn(ping_loop(Arc::clone(shared), options.ping_interval));
        shared
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ping_task);

        let payload = shared
            .round_trip(
                Frame::new(proto::DeviceInfoRequest::TYPE, Vec::new()),
                proto::DeviceInfoResponse::TYPE,
                "DeviceInfoResponse",
                options.connect_timeout,
            )
            .await?;
        let info = proto::DeviceInfoResponse::decode(&payload)
            .map_err(|err| EspHomeError::Protocol(err.to_string()))?;
        tracing::info!(
            device = %shared.device_id,
            name = %info.name,
            mac = %info.mac_address,
            version = %info.esphome_version,
            "device online"
        );
        *shared
            .device_info
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(info);

        if options.forward_logs {
            let subscribe = proto::SubscribeLogsRequest {
                level: 3, // INFO
                dump_config: false,
            };
            shared
                .send_frame(&Frame::new(
                    proto::SubscribeLogsRequest::TYPE,
                    subscribe.encode(),
                ))
                .await?;
        }

        // Entity enumeration, then the state stream.
        let mut done = self.shared.entities_done.subscribe();
        shared
            .send_frame(&Frame::new(proto::ListEntitiesRequest::TYPE, Vec::new()))
            .await?;
        if tokio::time::timeout(LIST_ENTITIES_DEADLINE, done.wait_for(|done| *done))
            .await
            .is_err()
        {
            tracing::warn!(
                device = %shared.device_id,
                "entity enumeration did not finish in time, continuing with partial list"
            );
        }

        shared
            .send_frame(&Frame::new(proto::SubscribeStatesRequest::TYPE, Vec::new()))
            .await?;

        Ok(())
    }

    /// Send a typed command frame.
    pub(crate) async fn send(&self, frame: &Frame) -> Result<(), EspHomeError> {
        if self.is_closed() {
            return Err(EspHomeError::NotConnected(
                self.shared.device_id.to_string(),
            ));
        }
        self.shared.send_frame(frame).await
    }

    /// Graceful teardown: tell the device, then close without reconnect.
    pub(crate) async fn shutdown(&self) {
        let _ = self
            .shared
            .send_frame(&Frame::new(proto::DisconnectRequest::TYPE, Vec::new()))
            .await;
        self.shared.close(true).await;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Snapshot of the enumerated entities.
    pub(crate) fn entities(&self) -> Vec<EspHomeEntity> {
        self.shared
            .entities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub(crate) fn entity_by_object_id(&self, object_id: &str) -> Option<EspHomeEntity> {
        self.shared
            .entities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|entity| entity.object_id == object_id)
            .cloned()
    }

    pub(crate) fn device_info(&self) -> Option<proto::DeviceInfoResponse> {
        self.shared
            .device_info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

async fn read_loop(shared: Arc<Shared>, mut reader: OwnedReadHalf) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; 4096];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                tracing::debug!(device = %shared.device_id, %err, "socket read failed");
                break;
            }
        };
        decoder.feed(&buf[..n]);

        loop {
            match decoder.next_frame() {
                Ok(Some(frame)) => handle_frame(&shared, frame).await,
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(device = %shared.device_id, %err, "closing desynchronized stream");
                    shared.close(false).await;
                    return;
                }
            }
        }

        if shared.closed.load(Ordering::SeqCst) {
            return;
        }
    }

    tracing::debug!(device = %shared.device_id, "connection closed by peer");
    shared.close(false).await;
}

async fn handle_frame(shared: &Arc<Shared>, frame: Frame) {
    // Request/response correlation wins over stream handling.
    let pending = shared.lock_pending().remove(&frame.msg_type);
    if let Some(tx) = pending {
        let _ = tx.send(frame.payload);
        return;
    }

    match frame.msg_type {
        proto::PingResponse::TYPE => {
            shared.missed_pings.store(0, Ordering::SeqCst);
        }
        proto::PingRequest::TYPE => {
            let _ = shared
                .send_frame(&Frame::new(proto::PingResponse::TYPE, Vec::new()))
                .await;
        }
        proto::DisconnectRequest::TYPE => {
            // Device-requested teardown; the discovery loop reconnects on
            // its next tick rather than the keep-alive reconnect path.
            let _ = shared
                .send_frame(&Frame::new(proto::DisconnectResponse::TYPE, Vec::new()))
                .await;
            shared.close(true).await;
        }
        proto::ListEntitiesDoneResponse::TYPE => {
            let count = shared
                .entities
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len();
            tracing::info!(device = %shared.device_id, count, "entity enumeration complete");
            let _ = shared.entities_done.send(true);
        }
        proto::SubscribeLogsResponse::TYPE => {
            if let Ok(log) = proto::SubscribeLogsResponse::decode(&frame.payload) {
                tracing::debug!(device = %shared.device_id, "{}", log.message);
            }
        }
        _ => {
            match entities::entity_from_frame(&frame) {
                Ok(Some(entity)) => {
                    shared
                        .entities
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(entity.key, entity);
                    return;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(device = %shared.device_id, %err, "bad entity listing payload");
                    return;
                }
            }

            match entities::state_from_frame(&frame) {
                Ok(Some((key, state))) => route_state(shared, key, state),
                Ok(None) => {
                    tracing::trace!(
                        device = %shared.device_id,
                        msg_type = frame.msg_type,
                        "ignoring frame"
                    );
                }
                Err(err) => {
                    tracing::warn!(device = %shared.device_id, %err, "bad state payload");
                }
            }
        }
    }
}

/// Dispatch a normalized state to the subscriber of the owning entity.
fn route_state(shared: &Arc<Shared>, key: u32, mut state: hearth_domain::state::StateMap) {
    let entity = {
        let entities = shared
            .entities
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entities.get(&key).cloned()
    };
    let Some(entity) = entity else {
        tracing::debug!(device = %shared.device_id, key, "state for unknown entity key");
        return;
    };

    if let Some(unit) = &entity.unit {
        if state.contains_key("value") {
            state.insert("unit".to_string(), AttributeValue::String(unit.clone()));
        }
    }

    let entity_id = entity.entity_id(&shared.device_id);
    let callback = {
        let callbacks = shared
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        callbacks.get(&entity_id).cloned()
    };
    if let Some(callback) = callback {
        callback(StateUpdate { entity_id, state });
    }
}

async fn ping_loop(shared: Arc<Shared>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; the first ping should wait one full
    // interval.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if shared.closed.load(Ordering::SeqCst) {
            return;
        }
        if shared.missed_pings.load(Ordering::SeqCst) >= MAX_MISSED_PINGS {
            tracing::warn!(device = %shared.device_id, "keep-alive lost, closing connection");
            shared.close(false).await;
            return;
        }
        if shared
            .send_frame(&Frame::new(proto::PingRequest::TYPE, Vec::new()))
            .await
            .is_err()
        {
            shared.close(false).await;
            return;
        }
        shared.missed_pings.fetch_add(1, Ordering::SeqCst);
    }
}
