//! Hue driver errors, wired into the core taxonomy.

use hearth_domain::error::HearthError;

/// Error codes the bridge returns that mean "fix your setup", not "retry".
const ERR_UNAUTHORIZED: i64 = 1;
const ERR_LINK_BUTTON: i64 = 101;

/// Errors raised by the Hue driver.
#[derive(Debug, thiserror::Error)]
pub enum HueError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bridge error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("malformed bridge reply: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("bridge {0} has no API user; press the link button and pair")]
    NotPaired(String),

    #[error("bridge {0} is not configured")]
    UnknownBridge(String),
}

impl From<HueError> for HearthError {
    fn from(err: HueError) -> Self {
        match &err {
            HueError::Api { code, .. } if *code == ERR_UNAUTHORIZED || *code == ERR_LINK_BUTTON => {
                Self::DriverFatal(err.to_string())
            }
            HueError::NotPaired(_) | HueError::UnknownBridge(_) => {
                Self::DriverFatal(err.to_string())
            }
            _ => Self::DriverTransient(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_link_button_error_to_fatal() {
        let err: HearthError = HueError::Api {
            code: 101,
            description: "link button not pressed".to_string(),
        }
        .into();
        assert!(matches!(err, HearthError::DriverFatal(_)));
    }

    #[test]
    fn should_map_other_api_errors_to_transient() {
        let err: HearthError = HueError::Api {
            code: 901,
            description: "internal error".to_string(),
        }
        .into();
        assert!(matches!(err, HearthError::DriverTransient(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn should_map_missing_user_to_fatal() {
        let err: HearthError = HueError::NotPaired("10.0.0.2".to_string()).into();
        assert!(matches!(err, HearthError::DriverFatal(_)));
    }
}
