// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Service evaluator: composable answer-policy trees.
//!
//! A *service* is a named tree of policy nodes loaded from a YAML file.
//! Leaves are [`endpoint::Endpoint`]s holding one prebuilt record and a
//! live health status; interior nodes combine their children by union
//! (multivalue), weighted selection (weight), priority (failover) or
//! client location (geolocation). Evaluation happens on the query path and
//! never blocks: endpoint health is an atomic read fed asynchronously by
//! the monitoring manager.
//!
//! Node constructors are dispatched through a [`ServicePlugins`] table
//! built at server start, keyed by the case-insensitive `type` field.

pub mod endpoint;
pub mod failover;
pub mod geolocation;
pub mod multivalue;
pub mod weight;

#[cfg(test)]
mod endpoint_tests;
#[cfg(test)]
mod mod_tests;
#[cfg(test)]
mod weight_tests;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::SystemTime;

use serde_yaml::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::rr::{Record, RecordType};
use crate::wire::EcsOption;

/// Capacity of an endpoint's status channel.
pub const STATUS_CHANNEL_CAPACITY: usize = 10;

/// Errors raised while loading or evaluating services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// A service file could not be read.
    #[error("failed to read service file '{path}': {reason}")]
    Read { path: String, reason: String },

    /// Structural YAML error at a node path.
    #[error("service config error at '{path}': {reason}")]
    Config { path: String, reason: String },

    /// The `type` field named no registered plugin.
    #[error("unknown service node type '{kind}' at '{path}'")]
    UnknownKind { path: String, kind: String },

    /// Two plugins registered under the same name.
    #[error("service plugin '{kind}' already registered")]
    PluginExists { kind: String },

    /// The top-level RRtype is missing or has no dynamic counterpart.
    #[error("RRtype '{token}' is not supported for services")]
    UnsupportedRrtype { token: String },

    /// Evaluation found no healthy backend below this node.
    #[error("monitoring status failed")]
    StatusFailed,

    /// The resolver asked for a service that is not registered.
    #[error("service '{name}' is not registered")]
    NotFound { name: String },

    /// The zone's dynamic type does not match the service's declared type.
    #[error("service '{name}' answers {declared}, query expanded to {requested}")]
    RrtypeMismatch {
        name: String,
        declared: RecordType,
        requested: RecordType,
    },
}

/// Per-query context handed to evaluators: the id drives weighted
/// selection, the transport address and ECS options drive geolocation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub query_id: u16,
    pub remote: SocketAddr,
    pub ecs: Vec<EcsOption>,
}

/// One node of a service tree.
pub trait ServiceNode: Send + Sync {
    /// Produces this node's records for a query, or [`ServiceError::StatusFailed`]
    /// when no healthy backend is available below it.
    fn get_records(&self, request: &RequestContext) -> Result<Vec<Record>, ServiceError>;

    /// Config path of this node inside its file, e.g. `service.values.a.next`.
    fn path(&self) -> &str;
}

/// A monitored endpoint discovered during tree construction: the
/// monitoring manager turns each of these into a monitor entry.
#[derive(Debug, Clone)]
pub struct MonitorBinding {
    /// Monitor name the endpoint subscribes to.
    pub monitor: String,
    /// Endpoint node path; identifies the entry across reloads.
    pub endpoint_path: String,
    /// Endpoint value handed to probes.
    pub value: String,
    /// Static RR type of the endpoint, checked against probe support.
    pub rtype: RecordType,
    /// Shared health flag, also read by the evaluator.
    pub status: Arc<AtomicBool>,
    /// Producer side of the endpoint's status channel.
    pub status_tx: mpsc::Sender<bool>,
}

/// Consumer side of one endpoint's status channel; the service manager
/// spawns a watch task per entry that drains it into `status`.
#[derive(Debug)]
pub struct EndpointWatch {
    pub status: Arc<AtomicBool>,
    pub rx: mpsc::Receiver<bool>,
}

/// Mutable state threaded through recursive tree construction.
pub struct ServiceBuild {
    /// Static RR type every endpoint of this service must produce.
    pub rtype: RecordType,
    /// Monitored endpoints collected so far.
    pub bindings: Vec<MonitorBinding>,
    /// Channel consumers collected so far.
    pub watches: Vec<EndpointWatch>,
}

/// Constructor signature for a node plugin.
pub type ServiceCtor = fn(
    &ServicePlugins,
    &mut ServiceBuild,
    String,
    &Value,
) -> Result<Box<dyn ServiceNode>, ServiceError>;

/// Immutable-after-init table of node constructors.
pub struct ServicePlugins {
    ctors: HashMap<String, ServiceCtor>,
}

impl ServicePlugins {
    /// The built-in node set: endpoint, multivalue, weight, failover,
    /// geolocation.
    #[must_use]
    pub fn standard() -> Self {
        let mut plugins = ServicePlugins {
            ctors: HashMap::new(),
        };
        for (name, ctor) in [
            ("ENDPOINT", endpoint::new as ServiceCtor),
            ("MULTIVALUE", multivalue::new as ServiceCtor),
            ("WEIGHT", weight::new as ServiceCtor),
            ("FAILOVER", failover::new as ServiceCtor),
            ("GEOLOCATION", geolocation::new as ServiceCtor),
        ] {
            plugins
                .register(name, ctor)
                .expect("built-in plugin names are distinct");
        }
        plugins
    }

    /// Registers an additional constructor under a case-insensitive name.
    pub fn register(&mut self, kind: &str, ctor: ServiceCtor) -> Result<(), ServiceError> {
        let key = kind.to_uppercase();
        if self.ctors.contains_key(&key) {
            return Err(ServiceError::PluginExists { kind: key });
        }
        self.ctors.insert(key, ctor);
        Ok(())
    }

    /// Builds the node at `node` (config path `path`) by dispatching on its
    /// `type` field, recursing into children.
    pub fn create(
        &self,
        build: &mut ServiceBuild,
        path: String,
        node: &Value,
    ) -> Result<Box<dyn ServiceNode>, ServiceError> {
        let kind = str_field(node, "type").ok_or_else(|| ServiceError::Config {
            path: path.clone(),
            reason: "missing 'type' field".to_string(),
        })?;
        let ctor = self
            .ctors
            .get(&kind.to_uppercase())
            .ok_or_else(|| ServiceError::UnknownKind {
                path: path.clone(),
                kind: kind.clone(),
            })?;
        ctor(self, build, path, node)
    }
}

/// A fully constructed service.
pub struct ServiceConfig {
    /// Service name: the file basename without `.yml`.
    pub name: String,
    /// Static type returned to clients.
    pub rtype: RecordType,
    /// Root of the evaluator tree.
    pub root: Box<dyn ServiceNode>,
    /// Monitored endpoints of the tree.
    pub bindings: Vec<MonitorBinding>,
    /// Source file modification time, compared on reload.
    pub mtime: SystemTime,
}

/// A service plus the endpoint watch receivers the manager must spawn.
pub struct LoadedService {
    pub config: ServiceConfig,
    pub watches: Vec<EndpointWatch>,
}

/// Loads one service file.
pub fn load_service(path: &Path, plugins: &ServicePlugins) -> Result<LoadedService, ServiceError> {
    let display = path.display().to_string();
    let read_err = |reason: String| ServiceError::Read {
        path: display.clone(),
        reason,
    };

    let name = service_name(path);
    let mtime = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| read_err(e.to_string()))?;
    let text = std::fs::read_to_string(path).map_err(|e| read_err(e.to_string()))?;
    let doc: Value = serde_yaml::from_str(&text).map_err(|e| read_err(e.to_string()))?;

    let token = str_field(&doc, "rrtype").ok_or_else(|| ServiceError::UnsupportedRrtype {
        token: String::new(),
    })?;
    let rtype = RecordType::from_token(&token)
        .filter(|t| t.dynamic_counterpart().is_some())
        .ok_or(ServiceError::UnsupportedRrtype { token })?;

    let root_value = field(&doc, "service").ok_or_else(|| ServiceError::Config {
        path: "service".to_string(),
        reason: "missing 'service' tree".to_string(),
    })?;

    let mut build = ServiceBuild {
        rtype,
        bindings: Vec::new(),
        watches: Vec::new(),
    };
    let root = plugins.create(&mut build, "service".to_string(), root_value)?;

    Ok(LoadedService {
        config: ServiceConfig {
            name,
            rtype,
            root,
            bindings: build.bindings,
            mtime,
        },
        watches: build.watches,
    })
}

/// Service name for a config path: basename without the `.yml` suffix.
#[must_use]
pub fn service_name(path: &Path) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    base.strip_suffix(".yml").unwrap_or(&base).to_string()
}

// ---------------------------------------------------------------------------
// YAML field access
// ---------------------------------------------------------------------------

/// Case-insensitive mapping lookup; config keys arrive in whatever case
/// the operator typed.
pub(crate) fn field<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    let map = value.as_mapping()?;
    map.iter()
        .find(|(k, _)| {
            k.as_str()
                .is_some_and(|k| k.eq_ignore_ascii_case(name))
        })
        .map(|(_, v)| v)
}

pub(crate) fn str_field(value: &Value, name: &str) -> Option<String> {
    match field(value, name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn u64_field(value: &Value, name: &str) -> Option<u64> {
    field(value, name)?.as_u64()
}
