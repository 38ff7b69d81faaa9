//! State store — last-write-wins snapshots and batched telemetry.
//!
//! Entity-state writes go straight to the repository under last-write-wins.
//! Telemetry samples are enqueued into an in-memory ring and flushed by a
//! background batcher in bulk inserts. A failed batch is logged and
//! dropped; unsynced samples are not durable.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use hearth_domain::error::Result;
use hearth_domain::event::BusEvent;
use hearth_domain::id::{EntityId, HomeId};
use hearth_domain::state::{EntityState, StateMap};
use hearth_domain::telemetry::{TelemetryPoint, TelemetryQuery};
use hearth_domain::time::now;

use crate::event_bus::EventBus;
use crate::ports::{EntityStateRepository, TelemetryRepository};

/// Tuning for the telemetry batcher.
#[derive(Debug, Clone)]
pub struct StateStoreConfig {
    /// Max rows per bulk insert.
    pub batch_size: usize,
    /// Flush cadence.
    pub batch_interval: Duration,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            batch_interval: Duration::from_millis(250),
        }
    }
}

struct StoreInner<S> {
    store: S,
    bus: EventBus,
    config: StateStoreConfig,
    queue: StdMutex<VecDeque<TelemetryPoint>>,
    batcher: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle over the shared store state.
pub struct StateStore<S> {
    inner: Arc<StoreInner<S>>,
}

impl<S> Clone for StateStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> StateStore<S>
where
    S: EntityStateRepository + TelemetryRepository + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(store: S, bus: EventBus, config: StateStoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                store,
                bus,
                config,
                queue: StdMutex::new(VecDeque::new()),
                batcher: Mutex::new(None),
            }),
        }
    }

    /// Upsert the current state of one entity, last-write-wins, stamping
    /// `updated_at` with the current time.
    ///
    /// Publishes nothing — the daemon's standing subscriptions own event
    /// flow.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn write_entity_state(&self, entity_id: &EntityId, state: StateMap) -> Result<()> {
        self.inner
            .store
            .upsert_entity_state(EntityState {
                entity_id: entity_id.clone(),
                state,
                updated_at: now(),
            })
            .await
    }

    /// Enqueue a telemetry sample and publish a `telemetry` event.
    pub fn append_telemetry(&self, point: TelemetryPoint) {
        self.inner.bus.publish(BusEvent::telemetry(
            point.entity_id.clone(),
            point.field.clone(),
            point.value,
            point.unit.clone(),
        ));
        self.enqueue_telemetry(point);
    }

    /// Enqueue a sample without republishing it. Used by the daemon's
    /// standing `telemetry` subscription, where the event already exists.
    pub fn enqueue_telemetry(&self, point: TelemetryPoint) {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(point);
    }

    /// Number of samples waiting for the next flush.
    #[must_use]
    pub fn pending_telemetry(&self) -> usize {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Start the background batcher. Idempotent: a running batcher is kept.
    pub async fn start_telemetry_batching(&self) {
        let mut batcher = self.inner.batcher.lock().await;
        if batcher.is_some() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        *batcher = Some(tokio::spawn(batch_loop(weak)));
    }

    /// Stop the batcher and flush every remaining sample.
    pub async fn stop_telemetry_batching(&self) {
        if let Some(handle) = self.inner.batcher.lock().await.take() {
            handle.abort();
        }
        // Final flush so K enqueued points mean K persisted rows.
        while flush_once(&self.inner).await > 0 {}
    }

    /// Current state snapshot for one entity.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn get_entity_state(&self, entity_id: &EntityId) -> Result<Option<EntityState>> {
        self.inner.store.entity_state(entity_id).await
    }

    /// Telemetry read path, per entity.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn get_entity_telemetry(
        &self,
        entity_id: &EntityId,
        query: &TelemetryQuery,
    ) -> Result<Vec<TelemetryPoint>> {
        self.inner.store.telemetry_by_entity(entity_id, query).await
    }

    /// Telemetry read path, per home.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn get_home_telemetry(
        &self,
        home_id: &HomeId,
        query: &TelemetryQuery,
    ) -> Result<Vec<TelemetryPoint>> {
        self.inner.store.telemetry_by_home(home_id, query).await
    }

    /// Retention sweep: drop telemetry older than `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the repository.
    pub async fn purge_telemetry_before(
        &self,
        cutoff: hearth_domain::time::Timestamp,
    ) -> Result<u64> {
        self.inner.store.purge_telemetry_before(cutoff).await
    }
}

async fn batch_loop<S>(inner: Weak<StoreInner<S>>)
where
    S: EntityStateRepository + TelemetryRepository + Send + Sync + 'static,
{
    let interval = match inner.upgrade() {
        Some(strong) => strong.config.batch_interval,
        None => return,
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // Consume the interval's immediate first tick; flushes start one full
    // cadence after the batcher comes up.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(strong) = inner.upgrade() else {
            return;
        };
        flush_once(&strong).await;
    }
}

/// Drain up to one batch into a single bulk insert. Returns how many
/// samples were taken off the queue (persisted or dropped).
async fn flush_once<S>(inner: &Arc<StoreInner<S>>) -> usize
where
    S: EntityStateRepository + TelemetryRepository + Send + Sync + 'static,
{
    let batch: Vec<TelemetryPoint> = {
        let mut queue = inner.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let take = queue.len().min(inner.config.batch_size);
        queue.drain(..take).collect()
    };
    if batch.is_empty() {
        return 0;
    }

    let len = batch.len();
    if let Err(err) = inner.store.insert_telemetry_batch(&batch).await {
        tracing::warn!(%err, dropped = len, "telemetry batch insert failed, dropping batch");
    }
    len
}
