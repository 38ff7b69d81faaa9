//! Capability — a typed descriptor of what an entity can do or report.

use serde::{Deserialize, Serialize};

use crate::state::StateMap;

/// Uniform descriptor of an entity's abilities.
///
/// `kind` is a free-form type tag (usually the entity kind, e.g. `"light"`);
/// `attributes` carries driver-specific hints (supported color modes, min/max
/// for numbers, …); `last_state` is the most recent state the driver saw at
/// enumeration time, when it has one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: StateMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state: Option<StateMap>,
}

impl Capability {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: StateMap::new(),
            last_state: None,
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<crate::state::AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}
