// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zone manager: the `zoneSet` registry.
//!
//! The registry is a label trie whose apex nodes carry zone metadata — the
//! loaded tree behind an `Arc`, the source mtime, the referenced services
//! and the load state. The trie itself persists across reloads; only the
//! metadata is swapped, so a resolver that cloned the old `Arc` keeps a
//! consistent tree for the query it is serving.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use anyhow::Context as _;
use tracing::{debug, info, warn};

use crate::name::{fqdn, labels};
use crate::server::services::ServiceManager;
use crate::tree::NameTree;
use crate::zone::{build_zone_tree, parse_zone, verify_zone, ZoneError, ZoneTree};

/// Outcome of the last load attempt for a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Ok,
    LoadError,
}

/// Metadata attached to an apex node of the registry.
pub struct ZoneMeta {
    pub mtime: SystemTime,
    pub state: LoadState,
    /// The loaded tree; `None` when no load has ever succeeded.
    pub tree: Option<Arc<ZoneTree>>,
    /// Services referenced by this zone's dynamic records.
    pub services: Vec<String>,
}

/// Result of the enclosing-zone lookup for a query name.
pub enum FindZone {
    /// No zone encloses the name; the server is not authoritative.
    None,
    /// A zone claims the name but has no loadable data.
    NoData(String),
    /// The enclosing zone and its tree.
    Found(String, Arc<ZoneTree>),
}

pub struct ZoneManager {
    inner: RwLock<Inner>,
}

struct Inner {
    zone_set: NameTree<Option<ZoneMeta>>,
    loading: HashMap<PathBuf, bool>,
}

impl ZoneManager {
    #[must_use]
    pub fn new() -> Self {
        ZoneManager {
            inner: RwLock::new(Inner {
                zone_set: NameTree::new(),
                loading: HashMap::new(),
            }),
        }
    }

    /// Loaded zone names, for the control API.
    #[must_use]
    pub fn zone_names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("zone lock");
        let mut names: Vec<String> = inner
            .loading
            .keys()
            .map(|path| zone_origin(path))
            .collect();
        names.sort();
        names
    }

    /// Walks up from the longest-prefix match of `qname_labels` to the
    /// nearest enclosing zone.
    #[must_use]
    pub fn find_zone(&self, qname_labels: &[String]) -> FindZone {
        let inner = self.inner.read().expect("zone lock");
        let Some(mut id) = inner.zone_set.search_node(qname_labels, false) else {
            return FindZone::None;
        };
        loop {
            let node = inner.zone_set.node(id);
            if let Some(meta) = &node.value {
                return match &meta.tree {
                    Some(tree) => FindZone::Found(node.label().to_string(), Arc::clone(tree)),
                    None => FindZone::NoData(node.label().to_string()),
                };
            }
            match node.parent() {
                Some(parent) => id = parent,
                None => return FindZone::None,
            }
        }
    }

    /// The loaded tree for an exact zone name, if any.
    #[must_use]
    pub fn zone_tree(&self, origin: &str) -> Option<Arc<ZoneTree>> {
        let inner = self.inner.read().expect("zone lock");
        let id = inner.zone_set.search_node(&labels(origin), true)?;
        inner
            .zone_set
            .node(id)
            .value
            .as_ref()
            .and_then(|meta| meta.tree.clone())
    }

    /// Loads one zone file. The apex is the file basename. On success the
    /// registry metadata is swapped atomically; on failure the previous
    /// tree keeps serving and the load state records the error.
    pub fn read_zone(&self, path: &Path, services: &ServiceManager) -> anyhow::Result<()> {
        let origin = zone_origin(path);
        let origin_labels = labels(&origin);

        let mtime = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .with_context(|| format!("cannot stat zone file {}", path.display()))?;
        {
            let inner = self.inner.read().expect("zone lock");
            if let Some(id) = inner.zone_set.search_node(&origin_labels, true) {
                if let Some(meta) = &inner.zone_set.node(id).value {
                    if meta.mtime == mtime && meta.state == LoadState::Ok {
                        return Ok(());
                    }
                }
            }
        }

        // Parse and verify on local state only; no lock is held while the
        // file is open.
        let result = self.build_zone(path, &origin, services);
        match result {
            Ok((tree, zone_services)) => {
                let previous_services = self.swap_meta(
                    &origin_labels,
                    ZoneMeta {
                        mtime,
                        state: LoadState::Ok,
                        tree: Some(Arc::new(tree)),
                        services: zone_services.clone(),
                    },
                );
                for service in &zone_services {
                    services.register_zone(service, &origin);
                }
                for dropped in previous_services
                    .iter()
                    .filter(|s| !zone_services.contains(*s))
                {
                    services.unregister_zone(dropped, &origin);
                }
                info!(zone = %origin, "load zone");
                Ok(())
            }
            Err(e) => {
                self.mark_load_error(&origin_labels, mtime);
                Err(e)
            }
        }
    }

    fn build_zone(
        &self,
        path: &Path,
        origin: &str,
        services: &ServiceManager,
    ) -> anyhow::Result<(ZoneTree, Vec<String>)> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read zone file {}", path.display()))?;
        let records = parse_zone(&text, origin)?;
        let (tree, zone_services) = build_zone_tree(records, origin);

        for service in &zone_services {
            if !services.has_service(service) {
                return Err(ZoneError::ServiceNotFound {
                    zone: origin.to_string(),
                    name: origin.to_string(),
                    service: service.clone(),
                }
                .into());
            }
        }
        verify_zone(&tree, &labels(origin))?;
        Ok((tree, zone_services))
    }

    /// Replaces the apex metadata, returning the previously referenced
    /// service names.
    fn swap_meta(&self, origin_labels: &[String], meta: ZoneMeta) -> Vec<String> {
        let mut inner = self.inner.write().expect("zone lock");
        let id = inner.zone_set.add_node(origin_labels);
        let node = inner.zone_set.node_mut(id);
        node.value
            .replace(meta)
            .map(|old| old.services)
            .unwrap_or_default()
    }

    fn mark_load_error(&self, origin_labels: &[String], mtime: SystemTime) {
        let mut inner = self.inner.write().expect("zone lock");
        let id = inner.zone_set.add_node(origin_labels);
        let node = inner.zone_set.node_mut(id);
        match &mut node.value {
            // Keep serving the previous tree; only flag the failed load.
            Some(meta) => meta.state = LoadState::LoadError,
            None => {
                node.value = Some(ZoneMeta {
                    mtime,
                    state: LoadState::LoadError,
                    tree: None,
                    services: Vec::new(),
                });
            }
        }
    }

    /// Loads or refreshes every zone file in `dir`.
    pub fn load_zones(&self, dir: &Path, services: &ServiceManager) -> anyhow::Result<()> {
        {
            let mut inner = self.inner.write().expect("zone lock");
            for stale in inner.loading.values_mut() {
                *stale = false;
            }
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("cannot list zones dir {}", dir.display()))?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        for path in files {
            let result = self.read_zone(&path, services);
            self.inner
                .write()
                .expect("zone lock")
                .loading
                .insert(path.clone(), true);
            if let Err(e) = result {
                warn!(file = %path.display(), error = %e, "failed to load zone");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Removes zones whose file disappeared, dropping their service
    /// references.
    pub fn delete_zones(&self, services: &ServiceManager) {
        let stale: Vec<PathBuf> = {
            let inner = self.inner.read().expect("zone lock");
            inner
                .loading
                .iter()
                .filter(|(_, &loaded)| !loaded)
                .map(|(path, _)| path.clone())
                .collect()
        };
        for path in stale {
            let origin = zone_origin(&path);
            let origin_labels = labels(&origin);
            let mut inner = self.inner.write().expect("zone lock");
            if let Some(id) = inner.zone_set.search_node(&origin_labels, true) {
                if let Some(meta) = inner.zone_set.node_mut(id).value.take() {
                    for service in &meta.services {
                        services.unregister_zone(service, &origin);
                    }
                }
            }
            // A nested zone may hang below this apex; in that case the
            // node stays and only its metadata is cleared.
            let _ = inner.zone_set.delete_node(&origin_labels, false);
            inner.loading.remove(&path);
            debug!(zone = %origin, "deleted zone");
        }
    }
}

impl Default for ZoneManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Zone apex for a file path: the FQDN-normalised, lower-cased basename.
#[must_use]
pub fn zone_origin(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    fqdn(&base).to_lowercase()
}
