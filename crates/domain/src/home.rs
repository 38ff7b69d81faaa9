//! Home — the container a single hub instance owns.

use serde::{Deserialize, Serialize};

use crate::error::{HearthError, ValidationError};
use crate::id::HomeId;
use crate::time::Timestamp;

/// Default home name created on first start-up.
pub const DEFAULT_HOME_NAME: &str = "Default Home";

/// A set of devices under one roof. Names are unique; the core never
/// deletes a home.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Home {
    pub id: HomeId,
    pub name: String,
    pub timezone: Option<String>,
    pub created_at: Timestamp,
}

impl Home {
    /// Create a home with a generated id and the current timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`HearthError::Validation`] when `name` is empty.
    pub fn new(name: impl Into<String>, timezone: Option<String>) -> Result<Self, HearthError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        Ok(Self {
            id: HomeId::generate(),
            name,
            timezone,
            created_at: crate::time::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_create_home_with_generated_id() {
        let home = Home::new("Default Home", Some("Europe/Paris".into())).unwrap();
        assert_eq!(home.name, "Default Home");
        assert_eq!(home.timezone.as_deref(), Some("Europe/Paris"));
        assert!(!home.id.is_empty());
    }

    #[test]
    fn should_reject_empty_name() {
        let result = Home::new("", None);
        assert!(matches!(
            result,
            Err(HearthError::Validation(ValidationError::EmptyName))
        ));
    }
}
