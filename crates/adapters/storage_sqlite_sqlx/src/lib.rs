//! # hearth-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter. One [`SqliteStore`] implements every
//! storage port trait defined in `hearth-app`; the repository
//! implementations live in one file per concern.
//!
//! ## Dependency rule
//!
//! Depends on `hearth-app` (port traits) and `hearth-domain` only.

mod credential_repo;
mod device_repo;
mod entity_repo;
mod entity_state_repo;
mod error;
mod home_repo;
mod pool;
mod telemetry_repo;

pub use error::StorageError;
pub use pool::{Config, Database};

use sqlx::SqlitePool;

/// `SQLite`-backed implementation of the full persistence surface.
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a store over an initialized connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
