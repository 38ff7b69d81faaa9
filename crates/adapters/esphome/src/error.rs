//! ESPHome driver errors, wired into the core taxonomy.
//!
//! Authentication failures and unsupported inputs are fatal (no retry);
//! socket, timeout and framing problems are transient.

use hearth_domain::error::HearthError;

/// Errors raised by the ESPHome driver.
#[derive(Debug, thiserror::Error)]
pub enum EspHomeError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("authentication rejected by device")]
    AuthFailed,

    #[error("framing error: {0}")]
    Framing(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("device {0} is not connected")]
    NotConnected(String),
}

impl From<EspHomeError> for HearthError {
    fn from(err: EspHomeError) -> Self {
        match err {
            EspHomeError::AuthFailed => Self::DriverFatal(err.to_string()),
            _ => Self::DriverTransient(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_auth_failure_to_fatal() {
        let err: HearthError = EspHomeError::AuthFailed.into();
        assert!(matches!(err, HearthError::DriverFatal(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn should_map_timeout_to_transient() {
        let err: HearthError = EspHomeError::Timeout("HelloResponse").into();
        assert!(matches!(err, HearthError::DriverTransient(_)));
        assert!(err.is_retryable());
    }
}
