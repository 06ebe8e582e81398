// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Health-monitoring probes and their configuration.
//!
//! A monitor file names a probe implementation plus timing and hysteresis
//! parameters. The monitoring manager binds monitors to service endpoints:
//! each binding becomes an [`entry::Entry`] running the probe on a ticker
//! and publishing UP/DOWN transitions to its endpoint. Probes implement
//! [`Probe`]; the set is open-ended through [`MonitorPlugins`], keyed by
//! the case-insensitive `monitor.type` field.

pub mod entry;
pub mod exec;
pub mod http;
pub mod ng;
pub mod ok;
pub mod tcpcon;


use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde_yaml::Value;
use thiserror::Error;

use crate::rr::RecordType;
use crate::service::{field, str_field, u64_field};

pub use entry::{Entry, StatusMachine, Thresholds};

/// Errors raised while loading monitors or binding endpoints to them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// A monitor file could not be read.
    #[error("failed to read monitor file '{path}': {reason}")]
    Read { path: String, reason: String },

    /// Structural or value error in a monitor file.
    #[error("monitor config error at '{path}': {reason}")]
    Config { path: String, reason: String },

    /// The `monitor.type` field named no registered probe.
    #[error("unknown monitor type '{kind}'")]
    UnknownKind { kind: String },

    /// Two probes registered under the same name.
    #[error("monitor plugin '{kind}' already registered")]
    PluginExists { kind: String },

    /// An endpoint subscribed to a monitor that is not registered.
    #[error("monitor '{name}' is not registered")]
    NotFound { name: String },

    /// The probe does not support the endpoint's RR type.
    #[error("monitor type '{probe}' does not support {rtype} endpoints")]
    UnsupportedRrtype { probe: &'static str, rtype: RecordType },
}

/// One probe implementation.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Rejects endpoint (value, RR type) pairs the probe cannot check.
    /// Called before any entry is spun up.
    fn check_register(&self, value: &str, rtype: RecordType) -> Result<(), MonitorError>;

    /// Runs one probe against the endpoint value. `true` means healthy.
    /// The caller enforces the monitor's timeout around this future.
    async fn run(&self, value: &str, rtype: RecordType) -> bool;

    /// Config path of the probe inside its file.
    fn path(&self) -> &str;
}

/// A loaded monitor definition.
pub struct MonitorConfig {
    /// Monitor name: file basename without `.yml`.
    pub name: String,
    /// Probe period.
    pub interval: Duration,
    /// Per-probe timeout; a timeout counts as a failed probe.
    pub timeout: Duration,
    /// UP/OK/NG hysteresis thresholds.
    pub thresholds: Thresholds,
    /// The probe implementation.
    pub probe: Arc<dyn Probe>,
    /// Source file modification time, compared on reload.
    pub mtime: SystemTime,
}

/// Constructor signature for a probe plugin.
pub type ProbeCtor = fn(String, &Value) -> Result<Arc<dyn Probe>, MonitorError>;

/// Immutable-after-init table of probe constructors.
pub struct MonitorPlugins {
    ctors: HashMap<String, ProbeCtor>,
}

impl MonitorPlugins {
    /// The built-in probe set: tcpcon, http, exec, ok, ng.
    #[must_use]
    pub fn standard() -> Self {
        let mut plugins = MonitorPlugins {
            ctors: HashMap::new(),
        };
        for (name, ctor) in [
            ("TCPCON", tcpcon::new as ProbeCtor),
            ("HTTP", http::new as ProbeCtor),
            ("EXEC", exec::new as ProbeCtor),
            ("OK", ok::new as ProbeCtor),
            ("NG", ng::new as ProbeCtor),
        ] {
            plugins
                .register(name, ctor)
                .expect("built-in plugin names are distinct");
        }
        plugins
    }

    /// Registers an additional probe under a case-insensitive name.
    pub fn register(&mut self, kind: &str, ctor: ProbeCtor) -> Result<(), MonitorError> {
        let key = kind.to_uppercase();
        if self.ctors.contains_key(&key) {
            return Err(MonitorError::PluginExists { kind: key });
        }
        self.ctors.insert(key, ctor);
        Ok(())
    }

    /// Builds the probe described at `node` by dispatching on its `type`.
    pub fn create(&self, path: String, node: &Value) -> Result<Arc<dyn Probe>, MonitorError> {
        let kind = str_field(node, "type").ok_or_else(|| MonitorError::Config {
            path: path.clone(),
            reason: "missing 'type' field".to_string(),
        })?;
        let ctor = self
            .ctors
            .get(&kind.to_uppercase())
            .ok_or(MonitorError::UnknownKind { kind })?;
        ctor(path, node)
    }
}

/// Loads one monitor file, applying the documented defaults.
pub fn load_monitor(path: &Path, plugins: &MonitorPlugins) -> Result<MonitorConfig, MonitorError> {
    let display = path.display().to_string();
    let read_err = |reason: String| MonitorError::Read {
        path: display.clone(),
        reason,
    };

    let name = monitor_name(path);
    let mtime = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| read_err(e.to_string()))?;
    let text = std::fs::read_to_string(path).map_err(|e| read_err(e.to_string()))?;
    let doc: Value = serde_yaml::from_str(&text).map_err(|e| read_err(e.to_string()))?;

    let interval_secs = u64_field(&doc, "interval").unwrap_or(10);
    if interval_secs == 0 {
        return Err(MonitorError::Config {
            path: display,
            reason: "interval must be greater than zero".to_string(),
        });
    }
    let timeout_secs = match u64_field(&doc, "timeout") {
        Some(0) | None => (interval_secs / 2).max(1),
        Some(t) => t,
    };
    if timeout_secs > interval_secs {
        return Err(MonitorError::Config {
            path: display,
            reason: "timeout is greater than interval".to_string(),
        });
    }

    let thresholds = Thresholds {
        up: threshold(&doc, "upthreshold", 20, &display)?,
        ok: threshold(&doc, "okthreshold", 10, &display)?,
        ng: threshold(&doc, "ngthreshold", 10, &display)?,
    };

    let probe_node = field(&doc, "monitor").ok_or_else(|| MonitorError::Config {
        path: display.clone(),
        reason: "missing 'monitor' section".to_string(),
    })?;
    let probe = plugins.create("monitor".to_string(), probe_node)?;

    Ok(MonitorConfig {
        name,
        interval: Duration::from_secs(interval_secs),
        timeout: Duration::from_secs(timeout_secs),
        thresholds,
        probe,
        mtime,
    })
}

fn threshold(doc: &Value, key: &str, default: u64, path: &str) -> Result<u16, MonitorError> {
    let value = u64_field(doc, key).unwrap_or(default);
    if value == 0 || value > u64::from(u16::MAX) {
        return Err(MonitorError::Config {
            path: path.to_string(),
            reason: format!("{key} must be 1-65535, got {value}"),
        });
    }
    Ok(value as u16)
}

/// Monitor name for a config path: basename without the `.yml` suffix.
#[must_use]
pub fn monitor_name(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    base.strip_suffix(".yml").unwrap_or(&base).to_string()
}
