//! Command router — idempotency, rate-limit, coalescing, retry with backoff.
//!
//! Rapid-update capabilities (dimmer scrubbing and friends) are coalesced:
//! within one coalesce window only the latest request per entity reaches the
//! driver, and superseded callers resolve successfully without a dispatch.
//! Everything else flows through the internal path: at most one identical
//! `(entity, capability)` command in flight, a per-entity sliding rate
//! window, then the driver invocation with exponential backoff between
//! retries. Each table sits behind its own mutex and no lock is held across
//! an await.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use hearth_domain::command::{CommandOutcome, CommandRequest};
use hearth_domain::error::{HearthError, Result};
use hearth_domain::event::BusEvent;
use hearth_domain::id::EntityId;

use crate::driver_registry::DriverRegistry;
use crate::event_bus::EventBus;
use crate::ports::{CredentialRepository, DeviceRepository, EntityRepository, HomeRepository};
use crate::registry::Registry;

/// Tuning knobs for the router; defaults follow the design targets.
#[derive(Debug, Clone)]
pub struct CommandRouterConfig {
    /// Sliding window for the per-entity command count.
    pub rate_limit_window: Duration,
    /// Max commands per entity per window.
    pub rate_limit_max: u32,
    /// Batching window for rapid-update capabilities.
    pub coalesce_window: Duration,
    /// Attempts for a single driver invocation.
    pub max_retries: u32,
    /// Base wait between attempts; doubles per attempt.
    pub retry_backoff: Duration,
    /// Upper bound on the per-attempt wait.
    pub retry_backoff_cap: Duration,
    /// Capabilities subject to coalescing.
    pub coalesceable_capabilities: HashSet<String>,
}

impl Default for CommandRouterConfig {
    fn default() -> Self {
        Self {
            rate_limit_window: Duration::from_millis(1000),
            rate_limit_max: 10,
            coalesce_window: Duration::from_millis(100),
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            retry_backoff_cap: Duration::from_millis(1000),
            coalesceable_capabilities: ["brightness", "color_temp", "hue", "saturation"]
                .into_iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

struct RateWindow {
    count: u32,
    window_start: Instant,
}

struct PendingCoalesce {
    request: CommandRequest,
    started: Instant,
    responder: oneshot::Sender<CommandOutcome>,
}

type ResultSlot = watch::Receiver<Option<CommandOutcome>>;

struct RouterInner<S> {
    registry: Arc<Registry<S>>,
    drivers: DriverRegistry,
    bus: EventBus,
    config: CommandRouterConfig,
    in_flight: StdMutex<HashMap<String, ResultSlot>>,
    rate_limit: StdMutex<HashMap<EntityId, RateWindow>>,
    coalesce: StdMutex<HashMap<EntityId, PendingCoalesce>>,
    coalescer: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle over the shared router state.
pub struct CommandRouter<S> {
    inner: Arc<RouterInner<S>>,
}

impl<S> Clone for CommandRouter<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> CommandRouter<S>
where
    S: HomeRepository
        + DeviceRepository
        + EntityRepository
        + CredentialRepository
        + Send
        + Sync
        + 'static,
{
    #[must_use]
    pub fn new(
        registry: Arc<Registry<S>>,
        drivers: DriverRegistry,
        bus: EventBus,
        config: CommandRouterConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                registry,
                drivers,
                bus,
                config,
                in_flight: StdMutex::new(HashMap::new()),
                rate_limit: StdMutex::new(HashMap::new()),
                coalesce: StdMutex::new(HashMap::new()),
                coalescer: Mutex::new(None),
            }),
        }
    }

    /// Route one normalized command. Latency in the outcome is measured
    /// from entry into this method.
    pub async fn process_command(&self, request: CommandRequest) -> CommandOutcome {
        let started = Instant::now();

        if self
            .inner
            .config
            .coalesceable_capabilities
            .contains(&request.capability)
        {
            let (responder, rx) = oneshot::channel();
            let superseded = self
                .inner
                .coalesce
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(
                    request.entity_id.clone(),
                    PendingCoalesce {
                        request,
                        started,
                        responder,
                    },
                );
            // The overwritten request never reaches the driver; its caller
            // still sees success.
            if let Some(previous) = superseded {
                let _ = previous.responder.send(CommandOutcome::superseded());
            }
            return match rx.await {
                Ok(outcome) => outcome,
                Err(_) => CommandOutcome::failure(
                    "command dropped before dispatch",
                    started.elapsed(),
                ),
            };
        }

        self.dispatch(request, started).await
    }

    /// Start the coalescer task draining the queue every coalesce window.
    /// Idempotent.
    pub async fn start_coalescing(&self) {
        let mut coalescer = self.inner.coalescer.lock().await;
        if coalescer.is_some() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        *coalescer = Some(tokio::spawn(coalesce_loop(weak)));
    }

    /// Stop the coalescer, dispatching whatever is still queued.
    pub async fn stop_coalescing(&self) {
        if let Some(handle) = self.inner.coalescer.lock().await.take() {
            handle.abort();
        }
        self.drain_coalesced().await;
    }

    /// Drop the in-flight, rate-limit and coalesce tables. For tests.
    /// Queued coalesced callers observe a dropped-command failure.
    pub fn clear(&self) {
        self.inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner
            .rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.inner
            .coalesce
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Dispatch every queued coalesced request through the internal path,
    /// completing each caller's future with the real outcome.
    async fn drain_coalesced(&self) {
        let pending: Vec<PendingCoalesce> = {
            let mut queue = self
                .inner
                .coalesce
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            queue.drain().map(|(_, entry)| entry).collect()
        };

        for entry in pending {
            let outcome = self.dispatch(entry.request, entry.started).await;
            let _ = entry.responder.send(outcome);
        }
    }

    /// Internal path: in-flight dedup, rate limit, resolution, retries,
    /// completion event.
    async fn dispatch(&self, request: CommandRequest, started: Instant) -> CommandOutcome {
        let key = format!("{}:{}", request.entity_id, request.capability);

        enum Role {
            Lead(watch::Sender<Option<CommandOutcome>>),
            Join(ResultSlot),
        }

        let role = {
            let mut in_flight = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = in_flight.get(&key) {
                Role::Join(slot.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                in_flight.insert(key.clone(), rx);
                Role::Lead(tx)
            }
        };

        match role {
            // At most one concurrent identical command per entity+capability:
            // later callers share the leader's result.
            Role::Join(mut slot) => match slot.wait_for(Option::is_some).await {
                Ok(outcome) => outcome
                    .as_ref()
                    .cloned()
                    .unwrap_or_else(|| {
                        CommandOutcome::failure("in-flight command vanished", started.elapsed())
                    }),
                Err(_) => {
                    CommandOutcome::failure("in-flight command abandoned", started.elapsed())
                }
            },
            Role::Lead(tx) => {
                let outcome = self.execute(&request, started).await;
                self.inner
                    .in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&key);
                let _ = tx.send(Some(outcome.clone()));

                self.inner.bus.publish(BusEvent::command(
                    request.entity_id.clone(),
                    request.capability.clone(),
                    outcome.success,
                    outcome
                        .latency
                        .map(|latency| u64::try_from(latency.as_millis()).unwrap_or(u64::MAX)),
                ));

                outcome
            }
        }
    }

    async fn execute(&self, request: &CommandRequest, started: Instant) -> CommandOutcome {
        if let Err(err) = self.check_rate_limit(&request.entity_id) {
            return CommandOutcome::failure(err.to_string(), started.elapsed());
        }

        let driver = match self.resolve_driver(request).await {
            Ok(driver) => driver,
            Err(err) => return CommandOutcome::failure(err.to_string(), started.elapsed()),
        };

        let attempts = self.inner.config.max_retries.max(1);
        let mut last_error = String::from("driver rejected command");

        for attempt in 1..=attempts {
            match driver.invoke(&request.entity_id, request).await {
                Ok(result) if result.ok => {
                    return CommandOutcome {
                        success: true,
                        error: None,
                        data: result.data,
                        latency: Some(started.elapsed()),
                    };
                }
                Ok(result) => {
                    if let Some(error) = result.error {
                        last_error = error;
                    }
                }
                Err(err) if err.is_retryable() => {
                    last_error = err.to_string();
                }
                // Fatal driver errors are surfaced immediately, no retry.
                Err(err) => {
                    return CommandOutcome::failure(err.to_string(), started.elapsed());
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        CommandOutcome::failure(last_error, started.elapsed())
    }

    /// Wait before attempt `attempt + 1`: base doubling per attempt, capped.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        (self.inner.config.retry_backoff * factor).min(self.inner.config.retry_backoff_cap)
    }

    fn check_rate_limit(&self, entity_id: &EntityId) -> Result<()> {
        let mut table = self
            .inner
            .rate_limit
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let window = table.entry(entity_id.clone()).or_insert(RateWindow {
            count: 0,
            window_start: now,
        });

        if now.duration_since(window.window_start) >= self.inner.config.rate_limit_window {
            window.count = 0;
            window.window_start = now;
        }
        if window.count >= self.inner.config.rate_limit_max {
            return Err(HearthError::RateLimited(entity_id.to_string()));
        }
        window.count += 1;
        Ok(())
    }

    async fn resolve_driver(
        &self,
        request: &CommandRequest,
    ) -> Result<Arc<dyn crate::ports::Driver>> {
        let entity = self.inner.registry.get_entity(&request.entity_id).await?;
        let device = self.inner.registry.get_device(&entity.device_id).await?;
        self.inner.drivers.require(&device.protocol)
    }
}

async fn coalesce_loop<S>(inner: Weak<RouterInner<S>>)
where
    S: HomeRepository
        + DeviceRepository
        + EntityRepository
        + CredentialRepository
        + Send
        + Sync
        + 'static,
{
    let window = match inner.upgrade() {
        Some(strong) => strong.config.coalesce_window,
        None => return,
    };
    let mut ticker = tokio::time::interval(window);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The interval's first tick completes immediately; consume it so the
    // first drain happens one full window after start.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(strong) = inner.upgrade() else {
            return;
        };
        let router = CommandRouter { inner: strong };
        router.drain_coalesced().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{Driver, StateCallback, Subscription};
    use crate::testing::InMemoryStore;
    use async_trait::async_trait;
    use hearth_domain::command::InvokeResult;
    use hearth_domain::device::DeviceDescriptor;
    use hearth_domain::entity::{EntityDescriptor, EntityKind};
    use hearth_domain::id::DeviceId;
    use hearth_domain::state::AttributeValue;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scriptable fake driver recording every invoke.
    struct ScriptedDriver {
        invokes: StdMutex<Vec<CommandRequest>>,
        /// Number of leading failures before reporting success.
        fail_first: AtomicU32,
        delay: Duration,
    }

    impl ScriptedDriver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                invokes: StdMutex::new(Vec::new()),
                fail_first: AtomicU32::new(0),
                delay: Duration::ZERO,
            })
        }

        fn failing_first(times: u32) -> Arc<Self> {
            Arc::new(Self {
                invokes: StdMutex::new(Vec::new()),
                fail_first: AtomicU32::new(times),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                invokes: StdMutex::new(Vec::new()),
                fail_first: AtomicU32::new(0),
                delay,
            })
        }

        fn invoke_count(&self) -> usize {
            self.invokes.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Driver for ScriptedDriver {
        fn protocol(&self) -> &'static str {
            "fake"
        }

        async fn initialize(&self) -> Result<()> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }

        async fn discover(&self) -> Result<Vec<DeviceDescriptor>> {
            Ok(Vec::new())
        }

        async fn connect(&self, _device_id: &DeviceId, _address: &str) -> Result<()> {
            Ok(())
        }

        async fn disconnect(&self, _device_id: &DeviceId) -> Result<()> {
            Ok(())
        }

        async fn device_info(&self, _device_id: &DeviceId) -> Result<Option<DeviceDescriptor>> {
            Ok(None)
        }

        async fn entities(&self, _device_id: &DeviceId) -> Result<Vec<EntityDescriptor>> {
            Ok(Vec::new())
        }

        async fn subscribe(
            &self,
            _entity_id: &EntityId,
            _callback: StateCallback,
        ) -> Result<Subscription> {
            Ok(Subscription::noop())
        }

        async fn invoke(
            &self,
            _entity_id: &EntityId,
            request: &CommandRequest,
        ) -> Result<InvokeResult> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.invokes.lock().unwrap().push(request.clone());
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Ok(InvokeResult::failure("transient device error"));
            }
            Ok(InvokeResult::success())
        }
    }

    struct Fixture {
        router: CommandRouter<InMemoryStore>,
        driver: Arc<ScriptedDriver>,
        entity_id: EntityId,
    }

    async fn fixture_with(driver: Arc<ScriptedDriver>, config: CommandRouterConfig) -> Fixture {
        let store = InMemoryStore::default();
        let registry = Registry::new(store).shared();
        let home = registry.get_or_create_home("Default Home", None).await.unwrap();
        let device = registry
            .upsert_device(&DeviceDescriptor::new("d1", "Fake Device", "fake"), &home.id)
            .await
            .unwrap();
        let entity = registry
            .upsert_entity(
                &EntityDescriptor::new("e1", "Lamp", EntityKind::Light),
                &device.id,
                &home.id,
            )
            .await
            .unwrap();

        let drivers = DriverRegistry::new();
        drivers.register(Arc::clone(&driver) as Arc<dyn Driver>);

        Fixture {
            router: CommandRouter::new(registry, drivers, EventBus::new(), config),
            driver,
            entity_id: entity.id,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(ScriptedDriver::new(), CommandRouterConfig::default()).await
    }

    #[tokio::test]
    async fn should_invoke_driver_for_plain_command() {
        let fx = fixture().await;
        let outcome = fx
            .router
            .process_command(CommandRequest::new(
                fx.entity_id.clone(),
                "on_off",
                true,
            ))
            .await;

        assert!(outcome.success);
        assert_eq!(fx.driver.invoke_count(), 1);
        assert!(outcome.latency.is_some());
    }

    #[tokio::test]
    async fn should_fail_with_not_found_for_unknown_entity() {
        let fx = fixture().await;
        let outcome = fx
            .router
            .process_command(CommandRequest::new("ghost", "on_off", true))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Entity ghost not found"));
        assert_eq!(fx.driver.invoke_count(), 0);
    }

    #[tokio::test]
    async fn should_share_one_invoke_between_identical_concurrent_commands() {
        let fx = fixture_with(
            ScriptedDriver::slow(Duration::from_millis(100)),
            CommandRouterConfig::default(),
        )
        .await;

        let first = {
            let router = fx.router.clone();
            let entity = fx.entity_id.clone();
            tokio::spawn(
                async move { router.process_command(CommandRequest::new(entity, "on_off", true)).await },
            )
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = fx
            .router
            .process_command(CommandRequest::new(fx.entity_id.clone(), "on_off", true))
            .await;
        let first = first.await.unwrap();

        assert!(first.success);
        assert!(second.success);
        assert_eq!(fx.driver.invoke_count(), 1);
    }

    #[tokio::test]
    async fn should_coalesce_rapid_brightness_commands_to_latest_value() {
        let fx = fixture().await;
        fx.router.start_coalescing().await;

        let mut handles = Vec::new();
        for value in (10..=100).step_by(10) {
            let router = fx.router.clone();
            let entity = fx.entity_id.clone();
            handles.push(tokio::spawn(async move {
                router
                    .process_command(CommandRequest::new(
                        entity,
                        "brightness",
                        f64::from(value),
                    ))
                    .await
            }));
            // Stay well inside one coalesce window.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        for handle in handles {
            let outcome = handle.await.unwrap();
            assert!(outcome.success);
        }

        assert_eq!(fx.driver.invoke_count(), 1);
        let seen = fx.driver.invokes.lock().unwrap();
        assert_eq!(seen[0].value, AttributeValue::Float(100.0));

        fx.router.stop_coalescing().await;
    }

    #[tokio::test]
    async fn should_dispatch_queued_coalesced_command_on_stop() {
        let fx = fixture().await;
        // Coalescer never started: the stop path drains.
        let router = fx.router.clone();
        let entity = fx.entity_id.clone();
        let pending = tokio::spawn(async move {
            router
                .process_command(CommandRequest::new(entity, "brightness", 55.0))
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        fx.router.stop_coalescing().await;

        let outcome = pending.await.unwrap();
        assert!(outcome.success);
        assert_eq!(fx.driver.invoke_count(), 1);
    }

    #[tokio::test]
    async fn should_rate_limit_the_eleventh_command_in_one_window() {
        let fx = fixture().await;

        for _ in 0..10 {
            let outcome = fx
                .router
                .process_command(CommandRequest::new(fx.entity_id.clone(), "on_off", true))
                .await;
            assert!(outcome.success);
        }

        let eleventh = fx
            .router
            .process_command(CommandRequest::new(fx.entity_id.clone(), "on_off", true))
            .await;

        assert!(!eleventh.success);
        assert_eq!(
            eleventh.error.as_deref(),
            Some(&*format!(
                "Rate limit exceeded for entity: {}",
                fx.entity_id
            ))
        );
        assert_eq!(fx.driver.invoke_count(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn should_allow_commands_again_after_window_passes() {
        let fx = fixture_with(
            ScriptedDriver::new(),
            CommandRouterConfig {
                rate_limit_max: 2,
                ..CommandRouterConfig::default()
            },
        )
        .await;

        for _ in 0..2 {
            let outcome = fx
                .router
                .process_command(CommandRequest::new(fx.entity_id.clone(), "on_off", true))
                .await;
            assert!(outcome.success);
        }
        let limited = fx
            .router
            .process_command(CommandRequest::new(fx.entity_id.clone(), "on_off", true))
            .await;
        assert!(!limited.success);

        tokio::time::advance(Duration::from_millis(1100)).await;

        let after = fx
            .router
            .process_command(CommandRequest::new(fx.entity_id.clone(), "on_off", true))
            .await;
        assert!(after.success);
    }

    #[tokio::test]
    async fn should_retry_with_backoff_and_report_success() {
        let fx = fixture_with(
            ScriptedDriver::failing_first(2),
            CommandRouterConfig::default(),
        )
        .await;

        let started = std::time::Instant::now();
        let outcome = fx
            .router
            .process_command(CommandRequest::new(fx.entity_id.clone(), "on_off", true))
            .await;
        let elapsed = started.elapsed();

        assert!(outcome.success);
        assert_eq!(fx.driver.invoke_count(), 3);
        // Two backoffs: 100ms then 200ms.
        assert!(elapsed >= Duration::from_millis(300), "elapsed: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(1), "elapsed: {elapsed:?}");
        assert!(outcome.latency.unwrap() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn should_surface_last_error_after_exhausting_retries() {
        let fx = fixture_with(
            ScriptedDriver::failing_first(10),
            CommandRouterConfig {
                retry_backoff: Duration::from_millis(1),
                ..CommandRouterConfig::default()
            },
        )
        .await;

        let outcome = fx
            .router
            .process_command(CommandRequest::new(fx.entity_id.clone(), "on_off", true))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("transient device error"));
        assert_eq!(fx.driver.invoke_count(), 3);
    }

    #[tokio::test]
    async fn should_cap_backoff_growth() {
        let fx = fixture().await;
        assert_eq!(fx.router.backoff(1), Duration::from_millis(100));
        assert_eq!(fx.router.backoff(2), Duration::from_millis(200));
        assert_eq!(fx.router.backoff(3), Duration::from_millis(400));
        assert_eq!(fx.router.backoff(5), Duration::from_millis(1000));
        assert_eq!(fx.router.backoff(12), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn should_clear_router_tables() {
        let fx = fixture().await;
        for _ in 0..10 {
            fx.router
                .process_command(CommandRequest::new(fx.entity_id.clone(), "on_off", true))
                .await;
        }

        fx.router.clear();

        let outcome = fx
            .router
            .process_command(CommandRequest::new(fx.entity_id.clone(), "on_off", true))
            .await;
        assert!(outcome.success);
    }
}
