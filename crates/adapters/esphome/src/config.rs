//! ESPHome driver configuration.

use std::time::Duration;

use serde::Deserialize;

/// Driver-wide settings, one instance per daemon.
///
/// Discovery is host-list driven: the mDNS browser lives outside the core,
/// so deployments list the devices (or let an external discovery service
/// rewrite the list).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EspHomeConfig {
    /// Default native-API port when a host entry has none.
    pub port: u16,
    /// Shared API password; per-host entries may override.
    pub password: String,
    /// Keep-alive probe cadence.
    #[serde(with = "millis")]
    pub ping_interval: Duration,
    /// Reconnect after an unexpected connection loss.
    pub reconnect: bool,
    /// Wait before a reconnect attempt.
    #[serde(with = "millis")]
    pub reconnect_interval: Duration,
    /// Hard deadline for each handshake phase.
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Forward device log lines through `tracing`.
    pub forward_logs: bool,
    /// Devices to discover, as `host` or `host:port`.
    pub hosts: Vec<String>,
}

impl Default for EspHomeConfig {
    fn default() -> Self {
        Self {
            port: 6053,
            password: String::new(),
            ping_interval: Duration::from_millis(15_000),
            reconnect: true,
            reconnect_interval: Duration::from_millis(30_000),
            connect_timeout: Duration::from_millis(5_000),
            forward_logs: false,
            hosts: Vec::new(),
        }
    }
}

impl EspHomeConfig {
    /// Split a host entry into `(host, port)`, falling back to the
    /// configured default port.
    #[must_use]
    pub fn host_port<'a>(&self, entry: &'a str) -> (&'a str, u16) {
        match entry.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (host, port),
                Err(_) => (entry, self.port),
            },
            None => (entry, self.port),
        }
    }
}

mod millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_default_to_design_cadences() {
        let config = EspHomeConfig::default();
        assert_eq!(config.port, 6053);
        assert_eq!(config.ping_interval, Duration::from_millis(15_000));
        assert!(config.reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(30_000));
        assert_eq!(config.connect_timeout, Duration::from_millis(5_000));
    }

    #[test]
    fn should_split_host_and_port() {
        let config = EspHomeConfig::default();
        assert_eq!(config.host_port("10.0.0.5:6054"), ("10.0.0.5", 6054));
        assert_eq!(config.host_port("10.0.0.5"), ("10.0.0.5", 6053));
        assert_eq!(config.host_port("bad:port"), ("bad:port", 6053));
    }

    #[test]
    fn should_deserialize_interval_fields_from_millis() {
        let config: EspHomeConfig = serde_json::from_str(
            r#"{"ping_interval": 5000, "hosts": ["10.0.0.5"], "reconnect": false}"#,
        )
        .unwrap();
        assert_eq!(config.ping_interval, Duration::from_millis(5000));
        assert!(!config.reconnect);
        assert_eq!(config.hosts, ["10.0.0.5"]);
    }
}
