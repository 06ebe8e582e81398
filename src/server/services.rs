// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service manager: the registry of loaded services.
//!
//! Besides the configs themselves the manager tracks which zones reference
//! each service (`using`), which is what makes deletion safe, and owns the
//! endpoint watch tasks that drain status channels into the atomic flags
//! the evaluator reads.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLock};

use anyhow::Context as _;
use tracing::{debug, warn};

use crate::rr::{Record, RecordType};
use crate::server::monitoring::{yml_files, MonitoringManager};
use crate::service::{
    load_service, service_name, RequestContext, ServiceConfig, ServiceError, ServicePlugins,
};

pub struct ServiceManager {
    plugins: ServicePlugins,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    services: HashMap<String, Arc<ServiceConfig>>,
    loading: HashMap<PathBuf, bool>,
    using: HashMap<String, HashSet<String>>,
}

impl ServiceManager {
    #[must_use]
    pub fn new(plugins: ServicePlugins) -> Self {
        ServiceManager {
            plugins,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Registered service names, for the control API.
    #[must_use]
    pub fn service_names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("service lock");
        let mut names: Vec<String> = inner.services.keys().cloned().collect();
        names.sort();
        names
    }

    /// The registered config for `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ServiceConfig>> {
        self.inner
            .read()
            .expect("service lock")
            .services
            .get(name)
            .cloned()
    }

    /// Evaluates a service for the resolver. `rtype` is the static type
    /// the dynamic record expands into; it must match the service's
    /// declared type.
    pub fn get_records(
        &self,
        request: &RequestContext,
        rtype: RecordType,
        name: &str,
    ) -> Result<Vec<Record>, ServiceError> {
        let config = self.get(name).ok_or_else(|| ServiceError::NotFound {
            name: name.to_string(),
        })?;
        if config.rtype != rtype {
            return Err(ServiceError::RrtypeMismatch {
                name: name.to_string(),
                declared: config.rtype,
                requested: rtype,
            });
        }
        config.root.get_records(request)
    }

    /// Records that `zone` references `service`.
    pub fn register_zone(&self, service: &str, zone: &str) {
        self.inner
            .write()
            .expect("service lock")
            .using
            .entry(service.to_string())
            .or_default()
            .insert(zone.to_string());
    }

    /// Drops `zone`'s reference to `service`.
    pub fn unregister_zone(&self, service: &str, zone: &str) {
        let mut inner = self.inner.write().expect("service lock");
        if let Some(zones) = inner.using.get_mut(service) {
            zones.remove(zone);
        }
    }

    /// True when `name` is registered; zone loads use this to resolve
    /// dynamic references.
    #[must_use]
    pub fn has_service(&self, name: &str) -> bool {
        self.inner
            .read()
            .expect("service lock")
            .services
            .contains_key(name)
    }

    /// Loads or refreshes every service file in `dir`, wiring monitored
    /// endpoints into the monitoring manager.
    pub async fn load_services(
        &self,
        dir: &Path,
        monitoring: &MonitoringManager,
    ) -> anyhow::Result<()> {
        {
            let mut inner = self.inner.write().expect("service lock");
            for stale in inner.loading.values_mut() {
                *stale = false;
            }
        }
        for path in
            yml_files(dir).with_context(|| format!("cannot list services dir {}", dir.display()))?
        {
            let result = self.add_service(&path, monitoring).await;
            self.inner
                .write()
                .expect("service lock")
                .loading
                .insert(path.clone(), true);
            if let Err(e) = result {
                warn!(file = %path.display(), error = %e, "failed to read service config");
                return Err(e);
            }
        }
        Ok(())
    }

    async fn add_service(
        &self,
        path: &Path,
        monitoring: &MonitoringManager,
    ) -> anyhow::Result<()> {
        let name = service_name(path);
        {
            let inner = self.inner.read().expect("service lock");
            if let (Some(current), Ok(meta)) = (inner.services.get(&name), std::fs::metadata(path))
            {
                if meta.modified().ok() == Some(current.mtime) {
                    return Ok(());
                }
            }
        }

        let loaded = load_service(path, &self.plugins)?;

        // Validate every binding before spinning anything up, then
        // register them all; a replaced service's entries are restarted by
        // registration itself.
        for binding in &loaded.config.bindings {
            monitoring
                .check_register(binding)
                .with_context(|| format!("service '{name}'"))?;
        }
        for binding in &loaded.config.bindings {
            monitoring.register(&name, binding).await?;
        }

        // One watch task per monitored endpoint: drains the status channel
        // into the flag the evaluator reads. The task ends when every
        // sender (the monitor entry) is gone.
        for mut watch in loaded.watches {
            tokio::spawn(async move {
                while let Some(status) = watch.rx.recv().await {
                    watch.status.store(status, Ordering::Relaxed);
                }
            });
        }

        let mut inner = self.inner.write().expect("service lock");
        inner.services.insert(name.clone(), Arc::new(loaded.config));
        inner.using.entry(name.clone()).or_default();
        debug!(service = %name, "loaded service config");
        Ok(())
    }

    /// Removes services whose file disappeared, unless a zone still
    /// references them. Their monitor entries are unregistered.
    pub fn delete_services(&self, monitoring: &MonitoringManager) {
        let mut inner = self.inner.write().expect("service lock");
        let stale: Vec<PathBuf> = inner
            .loading
            .iter()
            .filter(|(_, &loaded)| !loaded)
            .map(|(path, _)| path.clone())
            .collect();
        for path in stale {
            let name = service_name(&path);
            if inner.using.get(&name).is_some_and(|zones| !zones.is_empty()) {
                warn!(service = %name, "service file removed but zones still reference it");
                continue;
            }
            if let Some(config) = inner.services.remove(&name) {
                for binding in &config.bindings {
                    monitoring.unregister(&binding.monitor, &name, &binding.endpoint_path);
                }
            }
            inner.using.remove(&name);
            inner.loading.remove(&path);
            debug!(service = %name, "deleted service");
        }
    }
}
