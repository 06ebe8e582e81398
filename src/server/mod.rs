// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The server: registries, workers, reload controller and control API.
//!
//! [`ServerState`] is the shared root every task holds an `Arc` of. The
//! three registries inside it are mutated only by the reload controller
//! (serialised by [`master::Master`]'s reload lock) and read lock-free-ish
//! by the query path, which clones `Arc`s out of them and resolves against
//! those snapshots.

pub mod control;
pub mod master;
pub mod monitoring;
pub mod services;
pub mod worker;
pub mod zones;

#[cfg(test)]
mod reload_tests;
#[cfg(test)]
mod worker_tests;

use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::monitor::MonitorPlugins;
use crate::service::ServicePlugins;

use monitoring::MonitoringManager;
use services::ServiceManager;
use zones::ZoneManager;

/// Shared server state: the configuration and the three registries.
pub struct ServerState {
    config: RwLock<Arc<Config>>,
    pub zones: ZoneManager,
    pub services: ServiceManager,
    pub monitoring: MonitoringManager,
}

impl ServerState {
    /// Builds the state with explicit plugin tables; the standard tables
    /// come from [`ServicePlugins::standard`] and
    /// [`MonitorPlugins::standard`].
    #[must_use]
    pub fn new(
        config: Config,
        service_plugins: ServicePlugins,
        monitor_plugins: MonitorPlugins,
    ) -> Arc<Self> {
        Arc::new(ServerState {
            config: RwLock::new(Arc::new(config)),
            zones: ZoneManager::new(),
            services: ServiceManager::new(service_plugins),
            monitoring: MonitoringManager::new(monitor_plugins),
        })
    }

    /// The current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config.read().expect("config lock"))
    }

    /// Replaces the configuration (after a successful reconfig).
    pub fn set_config(&self, config: Config) {
        *self.config.write().expect("config lock") = Arc::new(config);
    }
}
