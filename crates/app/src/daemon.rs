//! Daemon orchestrator — discovery, subscription and state-writer wiring.
//!
//! The daemon owns the driver instances and every worker loop. State
//! writing has no loop of its own: it is implemented entirely by two
//! standing bus subscriptions (`entity/*/state` feeds the snapshot table,
//! `telemetry` resolves the home and feeds the batcher). Worker loops catch
//! failures around single units of work, so one bad device never halts a
//! tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use hearth_domain::command::{CommandOutcome, CommandRequest};
use hearth_domain::device::{Device, DeviceDescriptor};
use hearth_domain::entity::{Entity, EntityKind};
use hearth_domain::error::Result;
use hearth_domain::event::{BusEvent, EventPayload, LifecycleEvent, topics};
use hearth_domain::id::{EntityId, HomeId};
use hearth_domain::state::AttributeValue;
use hearth_domain::telemetry::{TelemetryPoint, TelemetryQuery, field_from_entity_name};
use hearth_domain::time::now;

use crate::command_router::{CommandRouter, CommandRouterConfig};
use crate::driver_registry::DriverRegistry;
use crate::event_bus::{BusSubscription, EventBus};
use crate::ports::{Driver, EntityFilter, HubStore, StateCallback, Subscription};
use crate::registry::Registry;
use crate::state_store::{StateStore, StateStoreConfig};

/// Daemon-level cadences and identity.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Name of the home ensured on start.
    pub home_name: String,
    pub home_timezone: Option<String>,
    /// Period of the discovery loop; the first tick runs immediately.
    pub discovery_interval: Duration,
    /// Period of the subscription loop.
    pub subscription_interval: Duration,
    /// Telemetry retention in days; 0 disables the sweep.
    pub telemetry_retention_days: u16,
    /// Period of the retention sweep.
    pub retention_sweep_interval: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            home_name: hearth_domain::home::DEFAULT_HOME_NAME.to_string(),
            home_timezone: None,
            discovery_interval: Duration::from_secs(15),
            subscription_interval: Duration::from_secs(3),
            telemetry_retention_days: 30,
            retention_sweep_interval: Duration::from_secs(60 * 60 * 24),
        }
    }
}

/// Snapshot of daemon health for the public surface.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub home_id: Option<HomeId>,
    pub protocols: Vec<String>,
    pub active_subscriptions: usize,
    pub pending_telemetry: usize,
}

struct DaemonInner<S> {
    config: DaemonConfig,
    bus: EventBus,
    registry: Arc<Registry<S>>,
    state_store: StateStore<S>,
    drivers: DriverRegistry,
    router: CommandRouter<S>,
    home_id: StdMutex<Option<HomeId>>,
    running: AtomicBool,
    loops: Mutex<Vec<JoinHandle<()>>>,
    standing: StdMutex<Vec<BusSubscription>>,
    entity_subs: Mutex<HashMap<EntityId, Subscription>>,
}

/// The hub runtime. Cloneable handle; all clones share one state.
pub struct Daemon<S> {
    inner: Arc<DaemonInner<S>>,
}

impl<S> Clone for Daemon<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: HubStore> Daemon<S> {
    /// Wire the runtime: event bus, registry, state store, driver registry
    /// (running the loader over `drivers`), command router, and the two
    /// standing state-writer subscriptions.
    pub async fn initialize(
        store: S,
        drivers: Vec<Arc<dyn Driver>>,
        config: DaemonConfig,
        router_config: CommandRouterConfig,
        state_config: StateStoreConfig,
    ) -> Self {
        let bus = EventBus::new();
        let registry = Registry::new(store.clone()).shared();
        let state_store = StateStore::new(store, bus.clone(), state_config);

        let driver_registry = DriverRegistry::new();
        driver_registry.load(drivers).await;

        let router = CommandRouter::new(
            Arc::clone(&registry),
            driver_registry.clone(),
            bus.clone(),
            router_config,
        );

        let daemon = Self {
            inner: Arc::new(DaemonInner {
                config,
                bus,
                registry,
                state_store,
                drivers: driver_registry,
                router,
                home_id: StdMutex::new(None),
                running: AtomicBool::new(false),
                loops: Mutex::new(Vec::new()),
                standing: StdMutex::new(Vec::new()),
                entity_subs: Mutex::new(HashMap::new()),
            }),
        };
        daemon.install_state_writer();
        daemon
    }

    /// The standing subscriptions implementing the state-writer design:
    /// `entity/*/state` → snapshot upsert, `telemetry` → home resolution +
    /// batcher enqueue.
    fn install_state_writer(&self) {
        let state_store = self.inner.state_store.clone();
        let state_sub = self.inner.bus.subscribe(
            topics::ENTITY_STATE_WILDCARD,
            Arc::new(move |event| {
                let state_store = state_store.clone();
                Box::pin(async move {
                    if let EventPayload::EntityState {
                        entity_id, state, ..
                    } = event.payload
                    {
                        state_store.write_entity_state(&entity_id, state).await?;
                    }
                    Ok(())
                })
            }),
        );

        let state_store = self.inner.state_store.clone();
        let registry = Arc::clone(&self.inner.registry);
        let telemetry_sub = self.inner.bus.subscribe(
            topics::TELEMETRY,
            Arc::new(move |event| {
                let state_store = state_store.clone();
                let registry = Arc::clone(&registry);
                Box::pin(async move {
                    if let EventPayload::Telemetry {
                        entity_id,
                        field,
                        value,
                        unit,
                    } = event.payload
                    {
                        let entity = registry.get_entity(&entity_id).await?;
                        let mut point =
                            TelemetryPoint::new(entity_id, entity.home_id, field, value);
                        point.unit = unit;
                        // The event already happened; enqueue without
                        // republishing.
                        state_store.enqueue_telemetry(point);
                    }
                    Ok(())
                })
            }),
        );

        self.inner
            .standing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([state_sub, telemetry_sub]);
    }

    /// Ensure the default home, start the batcher and coalescer, and spawn
    /// the worker loops. Idempotent: a running daemon is left alone.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the default home cannot be ensured.
    pub async fn start(&self) -> Result<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let home = self
            .inner
            .registry
            .get_or_create_home(
                &self.inner.config.home_name,
                self.inner.config.home_timezone.clone(),
            )
            .await?;
        tracing::info!(home = %home.id, name = %home.name, "home ready");
        *self
            .inner
            .home_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(home.id);

        self.inner.state_store.start_telemetry_batching().await;
        self.inner.router.start_coalescing().await;

        let mut loops = self.inner.loops.lock().await;
        loops.push(tokio::spawn(discovery_loop(Arc::downgrade(&self.inner))));
        loops.push(tokio::spawn(subscription_loop(Arc::downgrade(&self.inner))));
        if self.inner.config.telemetry_retention_days > 0 {
            loops.push(tokio::spawn(retention_loop(Arc::downgrade(&self.inner))));
        }

        tracing::info!("daemon started");
        Ok(())
    }

    /// Stop loops, flush the batcher, drain the coalescer, release every
    /// driver subscription, and shut down every driver.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        for handle in self.inner.loops.lock().await.drain(..) {
            handle.abort();
        }

        self.inner.router.stop_coalescing().await;
        self.inner.state_store.stop_telemetry_batching().await;

        for (_, subscription) in self.inner.entity_subs.lock().await.drain() {
            subscription.unsubscribe();
        }
        {
            let mut standing = self
                .inner
                .standing
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            for subscription in standing.drain(..) {
                subscription.unsubscribe();
            }
        }

        self.inner.drivers.shutdown_all().await;
        tracing::info!("daemon stopped");
    }

    /// Route one command through the router.
    pub async fn process_command(&self, request: CommandRequest) -> CommandOutcome {
        self.inner.router.process_command(request).await
    }

    /// Entities matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn get_entities(&self, filter: &EntityFilter) -> Result<Vec<Entity>> {
        self.inner.registry.get_entities(filter).await
    }

    /// Devices in a home.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn get_devices_by_home(&self, home_id: &HomeId) -> Result<Vec<Device>> {
        self.inner.registry.get_devices_by_home(home_id).await
    }

    /// Telemetry read path for one entity.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn get_entity_telemetry(
        &self,
        entity_id: &EntityId,
        query: &TelemetryQuery,
    ) -> Result<Vec<TelemetryPoint>> {
        self.inner
            .state_store
            .get_entity_telemetry(entity_id, query)
            .await
    }

    /// Current daemon health snapshot.
    pub async fn status(&self) -> DaemonStatus {
        DaemonStatus {
            running: self.inner.running.load(Ordering::SeqCst),
            home_id: self.current_home_id(),
            protocols: self.inner.drivers.protocols(),
            active_subscriptions: self.inner.entity_subs.lock().await.len(),
            pending_telemetry: self.inner.state_store.pending_telemetry(),
        }
    }

    /// Protocol tag → driver liveness.
    pub async fn driver_health(&self) -> HashMap<String, bool> {
        self.inner.drivers.health().await
    }

    /// The home this instance owns, once `start` ensured it.
    #[must_use]
    pub fn current_home_id(&self) -> Option<HomeId> {
        self.inner
            .home_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.inner.bus
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry<S>> {
        &self.inner.registry
    }

    #[must_use]
    pub fn state_store(&self) -> &StateStore<S> {
        &self.inner.state_store
    }

    #[must_use]
    pub fn driver_registry(&self) -> &DriverRegistry {
        &self.inner.drivers
    }

    #[must_use]
    pub fn command_router(&self) -> &CommandRouter<S> {
        &self.inner.router
    }
}

fn home_of<S>(inner: &DaemonInner<S>) -> Option<HomeId> {
    inner
        .home_id
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

async fn discovery_loop<S: HubStore>(inner: Weak<DaemonInner<S>>) {
    let interval = match inner.upgrade() {
        Some(strong) => strong.config.discovery_interval,
        None => return,
    };
    // First tick completes immediately: discovery runs once on start.
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(strong) = inner.upgrade() else {
            return;
        };
        discovery_tick(&strong).await;
    }
}

async fn discovery_tick<S: HubStore>(inner: &Arc<DaemonInner<S>>) {
    let Some(home_id) = home_of(inner) else {
        return;
    };

    for driver in inner.drivers.all() {
        let descriptors = match driver.discover().await {
            Ok(descriptors) => descriptors,
            Err(err) => {
                tracing::warn!(protocol = driver.protocol(), %err, "discovery failed");
                continue;
            }
        };

        for descriptor in descriptors {
            // Individual device failures are isolated.
            if let Err(err) = handle_discovered(inner, driver.as_ref(), &descriptor, &home_id).await
            {
                tracing::warn!(device = %descriptor.id, %err, "device discovery handling failed");
                inner.bus.publish(BusEvent::device_lifecycle(
                    descriptor.id.clone(),
                    LifecycleEvent::Error,
                    Some(serde_json::json!({ "error": err.to_string() })),
                ));
            }
        }
    }
}

async fn handle_discovered<S: HubStore>(
    inner: &Arc<DaemonInner<S>>,
    driver: &dyn Driver,
    descriptor: &DeviceDescriptor,
    home_id: &HomeId,
) -> Result<()> {
    let device = inner.registry.upsert_device(descriptor, home_id).await?;
    inner.bus.publish(BusEvent::device_lifecycle(
        device.id.clone(),
        LifecycleEvent::Discovered,
        None,
    ));

    let Some(address) = device.address.as_deref().filter(|a| !a.is_empty()) else {
        return Ok(());
    };

    match driver.connect(&device.id, address).await {
        Ok(()) => {
            inner.bus.publish(BusEvent::device_lifecycle(
                device.id.clone(),
                LifecycleEvent::Connected,
                None,
            ));
            if device.paired_at.is_none() {
                inner.registry.mark_device_paired(&device.id).await?;
                inner
                    .registry
                    .store_credentials(&device.id, driver.protocol(), Vec::new())
                    .await?;
                inner.bus.publish(BusEvent::device_lifecycle(
                    device.id.clone(),
                    LifecycleEvent::Paired,
                    None,
                ));
            }

            let entities = driver.entities(&device.id).await?;
            let count = entities.len();
            for entity in entities {
                inner
                    .registry
                    .upsert_entity(&entity, &device.id, home_id)
                    .await?;
            }
            inner.bus.publish(BusEvent::device_lifecycle(
                device.id.clone(),
                LifecycleEvent::EntitiesComplete,
                Some(serde_json::json!({ "count": count })),
            ));
            Ok(())
        }
        Err(err) => {
            tracing::warn!(device = %device.id, %err, "auto-connect failed");
            inner.bus.publish(BusEvent::device_lifecycle(
                device.id.clone(),
                LifecycleEvent::Error,
                Some(serde_json::json!({ "error": err.to_string() })),
            ));
            Ok(())
        }
    }
}

async fn subscription_loop<S: HubStore>(inner: Weak<DaemonInner<S>>) {
    let interval = match inner.upgrade() {
        Some(strong) => strong.config.subscription_interval,
        None => return,
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(strong) = inner.upgrade() else {
            return;
        };
        subscription_tick(&strong).await;
    }
}

async fn subscription_tick<S: HubStore>(inner: &Arc<DaemonInner<S>>) {
    let entities = match inner.registry.get_entities(&EntityFilter::default()).await {
        Ok(entities) => entities,
        Err(err) => {
            tracing::warn!(%err, "entity enumeration failed");
            return;
        }
    };

    for entity in entities {
        if inner.entity_subs.lock().await.contains_key(&entity.id) {
            continue;
        }

        let result = try_subscribe(inner, &entity).await;
        match result {
            Ok(Some(subscription)) => {
                inner
                    .entity_subs
                    .lock()
                    .await
                    .insert(entity.id.clone(), subscription);
                tracing::debug!(entity = %entity.id, "subscribed to entity state");
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(entity = %entity.id, %err, "entity subscription failed");
            }
        }
    }
}

async fn try_subscribe<S: HubStore>(
    inner: &Arc<DaemonInner<S>>,
    entity: &Entity,
) -> Result<Option<Subscription>> {
    let device = inner.registry.get_device(&entity.device_id).await?;

    // Unpaired devices have no credential row yet; skip until pairing.
    let credentials = inner
        .registry
        .get_credentials(&device.id, Some(&device.protocol))
        .await?;
    if credentials.is_none() {
        return Ok(None);
    }

    let Some(driver) = inner.drivers.get(&device.protocol) else {
        return Ok(None);
    };

    let callback = state_callback(inner.bus.clone(), entity.clone());
    let subscription = driver.subscribe(&entity.id, callback).await?;
    Ok(Some(subscription))
}

/// Build the per-entity driver callback: publish the state event, and for
/// sensors carrying a `value`, a normalized telemetry event alongside.
fn state_callback(bus: EventBus, entity: Entity) -> StateCallback {
    Arc::new(move |update| {
        bus.publish(BusEvent::entity_state(
            update.entity_id.clone(),
            update.state.clone(),
            None,
        ));

        if entity.kind == EntityKind::Sensor {
            if let Some(value) = update.state.get("value") {
                let field = field_from_entity_name(&entity.name);
                let unit = update
                    .state
                    .get("unit")
                    .and_then(AttributeValue::as_str)
                    .map(ToString::to_string);
                bus.publish(BusEvent::telemetry(
                    entity.id.clone(),
                    field,
                    value.as_f64(),
                    unit,
                ));
            }
        }
    })
}

async fn retention_loop<S: HubStore>(inner: Weak<DaemonInner<S>>) {
    let (interval, retention_days) = match inner.upgrade() {
        Some(strong) => (
            strong.config.retention_sweep_interval,
            strong.config.telemetry_retention_days,
        ),
        None => return,
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(strong) = inner.upgrade() else {
            return;
        };
        let cutoff = now() - chrono::Duration::days(i64::from(retention_days));
        match strong.state_store.purge_telemetry_before(cutoff).await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "telemetry retention sweep"),
            Err(err) => tracing::warn!(%err, "telemetry retention sweep failed"),
        }
    }
}
