// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Monitoring manager: the registry of monitor configs and running
//! entries.
//!
//! Entries are keyed `(monitor, service, endpoint path)`. Registration
//! aborts any previous entry for the key before inserting the new one, so
//! exactly one prober exists per key. All mutation happens under the
//! reload controller's lock; the interior `RwLock` only protects readers
//! (the control API, snapshots) from seeing a map mid-update.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::monitor::{entry, load_monitor, Entry, MonitorConfig, MonitorError, MonitorPlugins};
use crate::service::MonitorBinding;
use crate::state::{self, StateSnapshot};

type EntryMap = HashMap<String, HashMap<String, HashMap<String, Entry>>>;

pub struct MonitoringManager {
    plugins: MonitorPlugins,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    monitors: HashMap<String, Arc<MonitorConfig>>,
    loading: HashMap<PathBuf, bool>,
    entries: EntryMap,
    /// Persisted statuses loaded at startup; consulted once per binding.
    seed: StateSnapshot,
}

impl MonitoringManager {
    #[must_use]
    pub fn new(plugins: MonitorPlugins) -> Self {
        MonitoringManager {
            plugins,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Installs the snapshot used to seed initial entry statuses.
    pub fn seed_states(&self, snapshot: StateSnapshot) {
        self.inner.write().expect("monitoring lock").seed = snapshot;
    }

    /// Registered monitor names, for the control API.
    #[must_use]
    pub fn monitor_names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("monitoring lock");
        let mut names: Vec<String> = inner.monitors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Validates that a binding's monitor exists and supports the
    /// endpoint's RR type. Called for every binding before any entry is
    /// spun up.
    pub fn check_register(&self, binding: &MonitorBinding) -> Result<(), MonitorError> {
        let inner = self.inner.read().expect("monitoring lock");
        let config = inner
            .monitors
            .get(&binding.monitor)
            .ok_or_else(|| MonitorError::NotFound {
                name: binding.monitor.clone(),
            })?;
        config.probe.check_register(&binding.value, binding.rtype)
    }

    /// Starts (or restarts) the entry for one binding. The initial status
    /// comes from, in order: the entry being replaced, the persisted
    /// snapshot, one synchronous probe.
    pub async fn register(
        &self,
        service: &str,
        binding: &MonitorBinding,
    ) -> Result<(), MonitorError> {
        let (config, previous, seeded) = {
            let mut inner = self.inner.write().expect("monitoring lock");
            let config = Arc::clone(inner.monitors.get(&binding.monitor).ok_or_else(|| {
                MonitorError::NotFound {
                    name: binding.monitor.clone(),
                }
            })?);
            let previous = inner
                .entries
                .get_mut(&binding.monitor)
                .and_then(|services| services.get_mut(service))
                .and_then(|paths| paths.remove(&binding.endpoint_path));
            let seeded = state::lookup(
                &inner.seed,
                &binding.monitor,
                service,
                &binding.endpoint_path,
            );
            (config, previous, seeded)
        };

        let initial = match (&previous, seeded) {
            (Some(entry), _) => {
                entry.stop();
                debug!(
                    monitor = %binding.monitor,
                    service = %service,
                    endpoint = %binding.endpoint_path,
                    "stopped previous monitor entry"
                );
                entry.status()
            }
            (None, Some(status)) => status,
            (None, None) => {
                // First sighting of this endpoint: probe once so the
                // initial answer reflects reality, not optimism.
                tokio::time::timeout(
                    config.timeout,
                    config.probe.run(&binding.value, binding.rtype),
                )
                .await
                .unwrap_or(false)
            }
        };

        let entry = entry::spawn(
            config,
            service.to_string(),
            binding.endpoint_path.clone(),
            binding.value.clone(),
            binding.rtype,
            initial,
            binding.status_tx.clone(),
        );
        debug!(
            monitor = %binding.monitor,
            service = %service,
            endpoint = %binding.endpoint_path,
            value = %binding.value,
            status = initial,
            "started monitoring"
        );

        let mut inner = self.inner.write().expect("monitoring lock");
        inner
            .entries
            .entry(binding.monitor.clone())
            .or_default()
            .entry(service.to_string())
            .or_default()
            .insert(binding.endpoint_path.clone(), entry);
        Ok(())
    }

    /// Stops and removes the entry for one binding, pruning empty levels.
    pub fn unregister(&self, monitor: &str, service: &str, endpoint_path: &str) {
        let mut inner = self.inner.write().expect("monitoring lock");
        let Some(services) = inner.entries.get_mut(monitor) else {
            return;
        };
        if let Some(paths) = services.get_mut(service) {
            if let Some(entry) = paths.remove(endpoint_path) {
                entry.stop();
            }
            if paths.is_empty() {
                services.remove(service);
            }
        }
        if services.is_empty() {
            inner.entries.remove(monitor);
        }
    }

    /// Loads or refreshes every monitor file in `dir`. Files whose mtime
    /// is unchanged are skipped; a replaced config restarts its entries in
    /// place.
    pub async fn load_monitors(&self, dir: &Path) -> Result<(), MonitorError> {
        {
            let mut inner = self.inner.write().expect("monitoring lock");
            for stale in inner.loading.values_mut() {
                *stale = false;
            }
        }
        for path in yml_files(dir).map_err(|e| MonitorError::Read {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })? {
            let result = self.add_monitor(&path).await;
            self.inner
                .write()
                .expect("monitoring lock")
                .loading
                .insert(path.clone(), true);
            if let Err(e) = result {
                warn!(file = %path.display(), error = %e, "failed to read monitor config");
                return Err(e);
            }
        }
        Ok(())
    }

    async fn add_monitor(&self, path: &Path) -> Result<(), MonitorError> {
        let name = crate::monitor::monitor_name(path);
        {
            let inner = self.inner.read().expect("monitoring lock");
            if let (Some(current), Ok(meta)) = (inner.monitors.get(&name), std::fs::metadata(path))
            {
                if meta.modified().ok() == Some(current.mtime) {
                    return Ok(());
                }
            }
        }

        let config = Arc::new(load_monitor(path, &self.plugins)?);
        let replaced: Vec<(String, Entry)> = {
            let mut inner = self.inner.write().expect("monitoring lock");
            inner.monitors.insert(name.clone(), Arc::clone(&config));
            // Take the entries running under the old config; they are
            // re-inserted below under the new one.
            inner
                .entries
                .remove(&name)
                .map(|services| {
                    services
                        .into_iter()
                        .flat_map(|(service, paths)| {
                            paths
                                .into_values()
                                .map(move |entry| (service.clone(), entry))
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        // Restart each entry under the new timings, keeping its status.
        for (service, old) in replaced {
            old.stop();
            let entry = entry::spawn(
                Arc::clone(&config),
                service.clone(),
                old.path.clone(),
                old.value.clone(),
                old.rtype,
                old.status(),
                old.sender(),
            );
            let mut inner = self.inner.write().expect("monitoring lock");
            inner
                .entries
                .entry(name.clone())
                .or_default()
                .entry(service)
                .or_default()
                .insert(entry.path.clone(), entry);
        }
        debug!(monitor = %name, "loaded monitor config");
        Ok(())
    }

    /// Removes monitors whose file disappeared, unless entries still
    /// reference them.
    pub fn delete_monitors(&self) {
        let mut inner = self.inner.write().expect("monitoring lock");
        let stale: Vec<PathBuf> = inner
            .loading
            .iter()
            .filter(|(_, &loaded)| !loaded)
            .map(|(path, _)| path.clone())
            .collect();
        for path in stale {
            let name = crate::monitor::monitor_name(&path);
            let referenced = inner.entries.get(&name).is_some_and(|s| !s.is_empty());
            if referenced {
                warn!(monitor = %name, "monitor file removed but endpoints still reference it");
                continue;
            }
            inner.entries.remove(&name);
            inner.monitors.remove(&name);
            inner.loading.remove(&path);
            debug!(monitor = %name, "deleted monitor");
        }
    }

    /// Builds the persistable snapshot of every entry's current status.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        let inner = self.inner.read().expect("monitoring lock");
        let mut snapshot = StateSnapshot::new();
        for (monitor, services) in &inner.entries {
            let per_monitor = snapshot.entry(monitor.clone()).or_default();
            for (service, paths) in services {
                let per_service = per_monitor.entry(service.clone()).or_default();
                for (path, entry) in paths {
                    per_service.insert(path.clone(), entry.status());
                }
            }
        }
        snapshot
    }

    /// Number of running entries, for reload-idempotence checks.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        let inner = self.inner.read().expect("monitoring lock");
        inner
            .entries
            .values()
            .flat_map(HashMap::values)
            .map(HashMap::len)
            .sum()
    }
}

/// The `*.yml` files of a directory, sorted for deterministic load order.
pub(crate) fn yml_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "yml"))
        .collect();
    files.sort();
    Ok(files)
}
