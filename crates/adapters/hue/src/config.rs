//! Hue driver configuration.

use std::time::Duration;

use serde::Deserialize;

/// Driver-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HueConfig {
    /// Bridges to manage.
    pub bridges: Vec<HueBridgeConfig>,
    /// Cadence of the light-state poll backing subscriptions, in ms.
    pub poll_interval_ms: u64,
}

/// One bridge entry.
#[derive(Debug, Clone, Deserialize)]
pub struct HueBridgeConfig {
    /// Bridge IP or hostname.
    pub address: String,
    /// Existing API user; when absent, `pair` must create one via the link
    /// button.
    #[serde(default)]
    pub username: Option<String>,
}

impl Default for HueConfig {
    fn default() -> Self {
        Self {
            bridges: Vec::new(),
            poll_interval_ms: 2000,
        }
    }
}

impl HueConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
