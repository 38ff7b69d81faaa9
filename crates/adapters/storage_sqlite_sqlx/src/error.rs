//! Storage adapter errors, wired into [`HearthError::Persistence`].

use hearth_domain::error::HearthError;

/// Errors raised by the `SQLite` adapter.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StorageError> for HearthError {
    fn from(err: StorageError) -> Self {
        Self::Persistence(Box::new(err))
    }
}
