//! # hearthd — hearth hub daemon
//!
//! Composition root: loads configuration, opens the `SQLite` store,
//! constructs the enabled drivers, wires the daemon, and runs it until
//! SIGINT. No domain logic belongs here.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use hearth_adapter_esphome::EspHomeDriver;
use hearth_adapter_hue::HueDriver;
use hearth_adapter_storage_sqlite_sqlx::{Config as StorageConfig, SqliteStore};
use hearth_app::daemon::Daemon;
use hearth_app::ports::Driver;

mod config;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading hearth.toml")?;

    tracing_subscriber::fmt()
        .with_env_filter(config.logging.filter.clone())
        .init();

    let hub_id = config.hub.id.clone().unwrap_or_default();
    info!(hub = %hub_id, "starting hearthd");

    let database = StorageConfig {
        database_url: config.database.url.clone(),
    }
    .build()
    .await
    .context("opening database")?;
    let store = SqliteStore::new(database.pool().clone());

    let mut drivers: Vec<Arc<dyn Driver>> = Vec::new();
    if config.esphome.enabled {
        drivers.push(Arc::new(EspHomeDriver::new(config.esphome.driver.clone())));
    }
    if config.hue.enabled {
        drivers.push(Arc::new(HueDriver::new(config.hue.driver.clone())));
    }

    let daemon = Daemon::initialize(
        store,
        drivers,
        config.daemon_config(),
        config.command_router_config(),
        config.state_store_config(),
    )
    .await;

    daemon.start().await.context("starting daemon")?;
    info!("hearthd running, press ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");
    daemon.stop().await;

    Ok(())
}
