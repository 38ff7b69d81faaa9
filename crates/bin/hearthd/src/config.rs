//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `hearth.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use hearth_adapter_esphome::EspHomeConfig;
use hearth_adapter_hue::HueConfig;
use hearth_app::command_router::CommandRouterConfig;
use hearth_app::daemon::DaemonConfig;
use hearth_app::state_store::StateStoreConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hub identity.
    pub hub: HubConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Worker loop cadences.
    pub daemon: DaemonSection,
    /// Telemetry batching and retention.
    pub telemetry: TelemetrySection,
    /// Command router tuning.
    pub command: CommandSection,
    /// ESPHome driver settings.
    pub esphome: EspHomeSection,
    /// Hue driver settings.
    pub hue: HueSection,
}

/// Identity of this hub instance.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Stable identity string; generated when absent.
    pub id: Option<String>,
    /// Name of the home this hub owns.
    pub home_name: Option<String>,
    /// IANA timezone of the home.
    pub timezone: Option<String>,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Worker loop cadences.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    /// Period of the discovery loop, in ms.
    pub discovery_interval_ms: u64,
    /// Period of the subscription loop, in ms.
    pub subscription_interval_ms: u64,
}

/// Telemetry batching and retention.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    /// Max rows per batch flush.
    pub batch_size: usize,
    /// Flush cadence, in ms.
    pub batch_interval_ms: u64,
    /// Days of telemetry to retain; 0 disables the sweep.
    pub retention_days: u16,
}

/// Command router tuning.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CommandSection {
    pub rate_limit_window_ms: u64,
    pub rate_limit_max: u32,
    pub coalesce_window_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Capabilities collapsed within one coalesce window.
    pub coalesceable_capabilities: Vec<String>,
}

/// ESPHome driver toggle plus its settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EspHomeSection {
    pub enabled: bool,
    #[serde(flatten)]
    pub driver: EspHomeConfig,
}

/// Hue driver toggle plus its settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HueSection {
    pub enabled: bool,
    #[serde(flatten)]
    pub driver: HueConfig,
}

/// Raised when the configuration cannot be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    /// Load configuration from `hearth.toml` (if present) then apply
    /// environment-variable overrides. Generates a hub id when none is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed or fails
    /// validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("hearth.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        if config.hub.id.is_none() {
            config.hub.id = Some(uuid::Uuid::new_v4().to_string());
        }
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HEARTH_HUB_ID") {
            self.hub.id = Some(val);
        }
        if let Ok(val) = std::env::var("HEARTH_DATABASE_URL") {
            self.database.url = val;
        }
        if let Ok(val) = std::env::var("HEARTH_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("HEARTH_DISCOVERY_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                self.daemon.discovery_interval_ms = ms;
            }
        }
        if let Ok(val) = std::env::var("HEARTH_SUBSCRIPTION_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                self.daemon.subscription_interval_ms = ms;
            }
        }
        if let Ok(val) = std::env::var("HEARTH_ESPHOME_ENABLED") {
            self.esphome.enabled = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(val) = std::env::var("HEARTH_HUE_ENABLED") {
            self.hue.enabled = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(val) = std::env::var("HEARTH_TELEMETRY_RETENTION_DAYS") {
            if let Ok(days) = val.parse() {
                self.telemetry.retention_days = days;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry.batch_size == 0 {
            return Err(ConfigError::Validation(
                "telemetry.batch_size must be non-zero".to_string(),
            ));
        }
        if self.daemon.discovery_interval_ms == 0 || self.daemon.subscription_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "daemon intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Assemble the daemon-level config.
    #[must_use]
    pub fn daemon_config(&self) -> DaemonConfig {
        let defaults = DaemonConfig::default();
        DaemonConfig {
            home_name: self
                .hub
                .home_name
                .clone()
                .unwrap_or(defaults.home_name),
            home_timezone: self.hub.timezone.clone(),
            discovery_interval: Duration::from_millis(self.daemon.discovery_interval_ms),
            subscription_interval: Duration::from_millis(self.daemon.subscription_interval_ms),
            telemetry_retention_days: self.telemetry.retention_days,
            retention_sweep_interval: defaults.retention_sweep_interval,
        }
    }

    /// Assemble the state-store config.
    #[must_use]
    pub fn state_store_config(&self) -> StateStoreConfig {
        StateStoreConfig {
            batch_size: self.telemetry.batch_size,
            batch_interval: Duration::from_millis(self.telemetry.batch_interval_ms),
        }
    }

    /// Assemble the command-router config.
    #[must_use]
    pub fn command_router_config(&self) -> CommandRouterConfig {
        let defaults = CommandRouterConfig::default();
        CommandRouterConfig {
            rate_limit_window: Duration::from_millis(self.command.rate_limit_window_ms),
            rate_limit_max: self.command.rate_limit_max,
            coalesce_window: Duration::from_millis(self.command.coalesce_window_ms),
            max_retries: self.command.max_retries,
            retry_backoff: Duration::from_millis(self.command.retry_backoff_ms),
            retry_backoff_cap: defaults.retry_backoff_cap,
            coalesceable_capabilities: self
                .command
                .coalesceable_capabilities
                .iter()
                .cloned()
                .collect(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:hearth.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "hearthd=info,hearth=info".to_string(),
        }
    }
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            discovery_interval_ms: 15_000,
            subscription_interval_ms: 3_000,
        }
    }
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            batch_size: 500,
            batch_interval_ms: 250,
            retention_days: 30,
        }
    }
}

impl Default for CommandSection {
    fn default() -> Self {
        Self {
            rate_limit_window_ms: 1000,
            rate_limit_max: 10,
            coalesce_window_ms: 100,
            max_retries: 3,
            retry_backoff_ms: 100,
            coalesceable_capabilities: ["brightness", "color_temp", "hue", "saturation"]
                .into_iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl Default for EspHomeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            driver: EspHomeConfig::default(),
        }
    }
}

impl Default for HueSection {
    fn default() -> Self {
        Self {
            enabled: true,
            driver: HueConfig::default(),
        }
    }
}
