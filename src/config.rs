// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Server configuration.
//!
//! The top-level config is a TOML file; keys are accepted in both
//! snake_case and the PascalCase spelling older deployments use. Unknown
//! keys are rejected. Validation accumulates every problem instead of
//! stopping at the first so the operator fixes one round, not one key per
//! round.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading the server configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file '{path}': {reason}")]
    Read { path: String, reason: String },

    /// The config file is not valid TOML for [`Config`].
    #[error("cannot parse config file '{path}': {reason}")]
    Parse { path: String, reason: String },

    /// One or more keys failed validation.
    #[error("invalid configuration: {}", problems.join("; "))]
    Invalid { problems: Vec<String> },
}

/// Log levels accepted by `log_level`.
const LOG_LEVELS: [&str; 6] = ["panic", "fatal", "error", "warn", "info", "debug"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// DNS listen addresses; each gets a UDP and a TCP worker.
    #[serde(alias = "Listens")]
    pub listens: Vec<String>,

    /// Control-API listen addresses.
    #[serde(alias = "CtlListens")]
    pub ctl_listens: Vec<String>,

    /// Unprivileged user the server is expected to run as.
    #[serde(alias = "User")]
    pub user: String,

    /// One of panic, fatal, error, warn, info, debug.
    #[serde(alias = "LogLevel")]
    pub log_level: String,

    /// Queries served on one TCP connection before it is closed.
    #[serde(alias = "MaxTCPQueries")]
    pub max_tcp_queries: usize,

    /// Directory of zone files; the basename of each file is its apex.
    #[serde(alias = "ZonesDir")]
    pub zones_dir: PathBuf,

    /// Directory of service YAML files.
    #[serde(alias = "ServicesDir")]
    pub services_dir: PathBuf,

    /// Directory of monitor YAML files.
    #[serde(alias = "MonitorsDir")]
    pub monitors_dir: PathBuf,

    /// Monitor-status snapshot location.
    #[serde(alias = "StateFile")]
    pub state_file: PathBuf,

    /// Suppress authority/additional stapling on positive answers.
    #[serde(alias = "MinimumResponse")]
    pub minimum_response: bool,

    /// Rescan the zones directory on the periodic reload tick.
    #[serde(alias = "AutoZoneReload")]
    pub auto_zone_reload: bool,

    /// Rescan the services directory on the periodic reload tick.
    #[serde(alias = "AutoServiceReconfig")]
    pub auto_service_reconfig: bool,

    /// Rescan the monitors directory on the periodic reload tick.
    #[serde(alias = "AutoMonitorReconfig")]
    pub auto_monitor_reconfig: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listens: vec!["0.0.0.0:53".to_string(), "[::]:53".to_string()],
            ctl_listens: vec!["127.0.0.1:8053".to_string(), "[::1]:8053".to_string()],
            user: "warren".to_string(),
            log_level: "info".to_string(),
            max_tcp_queries: 1000,
            zones_dir: PathBuf::from("zones"),
            services_dir: PathBuf::from("services"),
            monitors_dir: PathBuf::from("monitors"),
            state_file: PathBuf::from("/tmp/warren-state.dat"),
            minimum_response: false,
            auto_zone_reload: true,
            auto_service_reconfig: true,
            auto_monitor_reconfig: true,
        }
    }
}

impl Config {
    /// Checks every key, collecting all problems.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.listens.is_empty() {
            problems.push("'listens' must name at least one address".to_string());
        }
        for listen in &self.listens {
            if listen.parse::<SocketAddr>().is_err() {
                problems.push(format!("'listens' entry '{listen}' is not host:port"));
            }
        }
        if self.ctl_listens.is_empty() {
            problems.push("'ctl_listens' must name at least one address".to_string());
        }
        for listen in &self.ctl_listens {
            if listen.parse::<SocketAddr>().is_err() {
                problems.push(format!("'ctl_listens' entry '{listen}' is not host:port"));
            }
        }
        if self.user.is_empty() {
            problems.push("'user' must not be empty".to_string());
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            problems.push(format!(
                "'log_level' must be one of {}, got '{}'",
                LOG_LEVELS.join("|"),
                self.log_level
            ));
        }
        if self.max_tcp_queries == 0 {
            problems.push("'max_tcp_queries' must be greater than 0".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    /// The tracing filter directive for `log_level`. The panic and fatal
    /// levels have no tracing counterpart and collapse to error.
    #[must_use]
    pub fn tracing_level(&self) -> &'static str {
        match self.log_level.as_str() {
            "panic" | "fatal" | "error" => "error",
            "warn" => "warn",
            "debug" => "debug",
            _ => "info",
        }
    }
}

/// Reads and validates the config file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: display.clone(),
        reason: e.to_string(),
    })?;
    let config: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: display,
        reason: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}
