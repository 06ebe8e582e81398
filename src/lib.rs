// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Warren - Authoritative DNS server with health-gated dynamic answers
//!
//! Warren serves authoritative DNS the usual way — zone files, wildcards,
//! CNAME/DNAME, delegation — and adds *dynamic records*: private RR types
//! whose rdata names a service, a composable policy tree evaluated at
//! query time against live health-monitoring results.
//!
//! ## Overview
//!
//! Three subsystems form the reactive pipeline:
//!
//! - the zone registry, a label trie resolving queries and pointing
//!   dynamic records at services;
//! - the service evaluator, policy trees (endpoint, multivalue, weight,
//!   failover, geolocation) producing records per query;
//! - the monitoring manager, periodic health probes whose UP/DOWN
//!   transitions flow through per-endpoint channels into the evaluator.
//!
//! A reload controller hot-reloads all three registries from their
//! directories, atomically and reference-count safely.
//!
//! ## Modules
//!
//! - [`tree`] / [`zone`] - label trie, master-file parsing, verification
//! - [`rr`] / [`wire`] - record model and DNS wire codec
//! - [`service`] - service policy trees
//! - [`monitor`] - health probes and hysteresis
//! - [`server`] - workers, registries, reload controller, control API
//! - [`config`] / [`state`] - server config and the status snapshot
//!
//! ## Example
//!
//! ```rust,no_run
//! use warren::config::Config;
//! use warren::monitor::MonitorPlugins;
//! use warren::server::ServerState;
//! use warren::service::ServicePlugins;
//!
//! let state = ServerState::new(
//!     Config::default(),
//!     ServicePlugins::standard(),
//!     MonitorPlugins::standard(),
//! );
//! assert!(state.zones.zone_names().is_empty());
//! ```

pub mod config;
pub mod monitor;
pub mod name;
pub mod rr;
pub mod server;
pub mod service;
pub mod state;
pub mod tree;
pub mod wire;
pub mod zone;

#[cfg(test)]
mod name_tests;
#[cfg(test)]
mod wire_tests;
