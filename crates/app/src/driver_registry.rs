//! Driver registry — protocol tag → driver instance lookup, plus the loader.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use hearth_domain::error::{NotFoundError, Result};

use crate::ports::Driver;

/// Mapping from protocol tag to a live driver instance.
///
/// `register_and_initialize` is the loader's entry point: a driver is never
/// visible through `get` before its `initialize()` succeeded.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: Arc<Mutex<HashMap<String, Arc<dyn Driver>>>>,
}

impl DriverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already-initialized driver under its protocol tag.
    pub fn register(&self, driver: Arc<dyn Driver>) {
        let tag = driver.protocol().to_string();
        self.drivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tag, driver);
    }

    /// Initialize the driver, then expose it. The driver stays invisible if
    /// `initialize()` fails.
    ///
    /// # Errors
    ///
    /// Propagates the driver's initialization error.
    pub async fn register_and_initialize(&self, driver: Arc<dyn Driver>) -> Result<()> {
        driver.initialize().await?;
        self.register(driver);
        Ok(())
    }

    /// Remove and return the driver for `protocol`, if registered.
    pub fn unregister(&self, protocol: &str) -> Option<Arc<dyn Driver>> {
        self.drivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(protocol)
    }

    #[must_use]
    pub fn get(&self, protocol: &str) -> Option<Arc<dyn Driver>> {
        self.drivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(protocol)
            .cloned()
    }

    /// Resolve a driver or fail with the router's `NotFound` taxonomy.
    ///
    /// # Errors
    ///
    /// Returns [`HearthError::NotFound`] when no driver answers to
    /// `protocol`.
    pub fn require(&self, protocol: &str) -> Result<Arc<dyn Driver>> {
        self.get(protocol)
            .ok_or_else(|| NotFoundError::new("Driver", protocol).into())
    }

    #[must_use]
    pub fn has(&self, protocol: &str) -> bool {
        self.drivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(protocol)
    }

    /// Registered protocol tags, sorted for stable output.
    #[must_use]
    pub fn protocols(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .drivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        tags.sort();
        tags
    }

    /// Every registered driver.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<dyn Driver>> {
        self.drivers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Protocol tag → liveness, from each driver's own probe.
    pub async fn health(&self) -> HashMap<String, bool> {
        let drivers: Vec<(String, Arc<dyn Driver>)> = {
            self.drivers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(tag, driver)| (tag.clone(), Arc::clone(driver)))
                .collect()
        };

        let mut report = HashMap::new();
        for (tag, driver) in drivers {
            report.insert(tag, driver.healthy().await);
        }
        report
    }

    /// Loader: register and initialize every driver the composition root
    /// constructed. An individual driver failing to initialize is logged
    /// and skipped; it never prevents the others from loading.
    pub async fn load(&self, drivers: Vec<Arc<dyn Driver>>) {
        for driver in drivers {
            let tag = driver.protocol();
            if self.has(tag) {
                tracing::warn!(protocol = tag, "driver already loaded, skipping");
                continue;
            }
            match self.register_and_initialize(driver).await {
                Ok(()) => tracing::info!(protocol = tag, "driver loaded"),
                Err(err) => {
                    tracing::warn!(protocol = tag, %err, "failed to load driver, skipping");
                }
            }
        }
    }

    /// Shut every driver down, logging failures. Used by the daemon's stop
    /// path.
    pub async fn shutdown_all(&self) {
        for driver in self.all() {
            if let Err(err) = driver.shutdown().await {
                tracing::warn!(protocol = driver.protocol(), %err, "driver shutdown failed");
            }
        }
    }
}
