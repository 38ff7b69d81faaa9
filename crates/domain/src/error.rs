//! Common error types used across the workspace.
//!
//! Each layer defines its own concrete error types. The domain layer provides
//! [`ValidationError`] and [`NotFoundError`] plus the top-level
//! [`HearthError`] taxonomy. Adapter layers define their own error enums
//! (e.g. `StorageError` wrapping `sqlx::Error`) and wire them into
//! [`HearthError`] via conversion.

/// Validation failures raised by domain invariant checks.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("name cannot be empty")]
    EmptyName,
    #[error("protocol cannot be empty")]
    EmptyProtocol,
    #[error("entity key cannot be empty")]
    EmptyEntityKey,
    #[error("missing capability: {0}")]
    MissingCapability(String),
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),
}

/// Returned when a lookup by identifier finds nothing.
#[derive(Debug, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

impl NotFoundError {
    #[must_use]
    pub fn new(entity: &'static str, id: impl Into<String>) -> Self {
        Self {
            entity,
            id: id.into(),
        }
    }
}

/// Top-level error taxonomy.
///
/// The variants map one-to-one onto the caller-visible failure classes:
/// `NotFound` and `Validation` are surfaced without retry, `RateLimited` is
/// surfaced immediately, `DriverTransient` is retried by the command router
/// before being surfaced, `DriverFatal` and `Persistence` are surfaced
/// immediately, and `Internal` is logged on the error bus topic while the
/// caller sees only a generic failure.
#[derive(Debug, thiserror::Error)]
pub enum HearthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("Rate limit exceeded for entity: {0}")]
    RateLimited(String),

    #[error("driver error: {0}")]
    DriverTransient(String),

    #[error("driver failure: {0}")]
    DriverFatal(String),

    #[error("Persistence error")]
    Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HearthError {
    /// Whether the command router should retry after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DriverTransient(_))
    }
}

/// Convenience alias used throughout the domain and application layers.
pub type Result<T> = std::result::Result<T, HearthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_not_found_error_with_entity_and_id() {
        let err = NotFoundError::new("Entity", "abc-123");
        assert_eq!(err.to_string(), "Entity abc-123 not found");
    }

    #[test]
    fn should_display_rate_limited_with_entity_id() {
        let err = HearthError::RateLimited("e1".to_string());
        assert_eq!(err.to_string(), "Rate limit exceeded for entity: e1");
    }

    #[test]
    fn should_convert_validation_error_into_hearth_error() {
        let err: HearthError = ValidationError::EmptyName.into();
        assert!(matches!(err, HearthError::Validation(_)));
    }

    #[test]
    fn should_mark_only_transient_driver_errors_retryable() {
        assert!(HearthError::DriverTransient("timeout".into()).is_retryable());
        assert!(!HearthError::DriverFatal("bad auth".into()).is_retryable());
        assert!(!HearthError::RateLimited("e1".into()).is_retryable());
        assert!(!HearthError::from(NotFoundError::new("Device", "d1")).is_retryable());
    }
}
