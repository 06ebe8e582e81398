// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Monitor-status snapshot file.
//!
//! The snapshot is a JSON document mapping
//! `monitor_name → service_name → endpoint_path → status` and exists so a
//! restart resumes with the last observed health instead of assuming every
//! backend is up. It is best-effort state: a missing or unreadable file
//! only means every endpoint starts from a fresh probe.
//!
//! Writes go to a `<path>.<pid>` temporary created fresh and are published
//! with an atomic rename, so readers never observe a half-written file.

use std::collections::HashMap;
use std::path::Path;

use tracing::warn;

/// `monitor_name → service_name → endpoint_path → status`.
pub type StateSnapshot = HashMap<String, HashMap<String, HashMap<String, bool>>>;

/// Reads the snapshot; `None` when the file is missing or unparseable
/// (both are logged and non-fatal).
#[must_use]
pub fn load_state(path: &Path) -> Option<StateSnapshot> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read state file");
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot parse state file");
            None
        }
    }
}

/// Writes the snapshot atomically.
pub fn save_state(path: &Path, snapshot: &StateSnapshot) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    let tmp = path.with_file_name(format!("{file_name}.{}", std::process::id()));
    let json = serde_json::to_vec_pretty(snapshot)?;
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}

/// Looks up one endpoint's persisted status.
#[must_use]
pub fn lookup(
    snapshot: &StateSnapshot,
    monitor: &str,
    service: &str,
    endpoint_path: &str,
) -> Option<bool> {
    snapshot.get(monitor)?.get(service)?.get(endpoint_path).copied()
}
