//! # hearth-app
//!
//! Application layer — the in-process runtime of the hub, plus the **port
//! definitions** (traits) adapters implement.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound):
//!   - storage repositories (homes, devices, entities, credentials,
//!     entity state, telemetry)
//!   - the [`Driver`](ports::Driver) plug-in contract protocol adapters
//!     satisfy
//! - Provide the **in-process runtime**:
//!   - [`EventBus`](event_bus::EventBus) — topic-scoped pub/sub with
//!     asynchronous dispatch
//!   - [`DriverRegistry`](driver_registry::DriverRegistry) — protocol tag →
//!     driver instance lookup and loading
//!   - [`Registry`](registry::Registry) — device/entity identity,
//!     fingerprint dedup, credential storage
//!   - [`StateStore`](state_store::StateStore) — last-write-wins snapshots
//!     and batched telemetry
//!   - [`CommandRouter`](command_router::CommandRouter) — idempotency,
//!     rate-limit, coalescing, retry with backoff
//!   - [`Daemon`](daemon::Daemon) — the orchestrator wiring it all together
//!
//! ## Dependency rule
//! Depends on `hearth-domain` only (plus `tokio` for tasks and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the
//! reverse.

pub mod command_router;
pub mod daemon;
pub mod driver_registry;
pub mod event_bus;
pub mod ports;
pub mod registry;
pub mod state_store;

#[cfg(test)]
pub(crate) mod testing;
