// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Exec probe: up when the configured command exits 0.
//!
//! `%%ITEM%%` arguments are replaced with the endpoint value. The child
//! process is spawned with kill-on-drop, so a probe timeout or entry
//! cancellation reaps it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_yaml::Value;
use tokio::process::Command;

use crate::monitor::{MonitorError, Probe};
use crate::rr::RecordType;

/// Placeholder substituted with the endpoint value.
const ITEM_TOKEN: &str = "%%ITEM%%";

pub struct ExecProbe {
    path: String,
    command: String,
    argv: Vec<String>,
}

pub fn new(path: String, node: &Value) -> Result<Arc<dyn Probe>, MonitorError> {
    let empty = || MonitorError::Config {
        path: path.clone(),
        reason: "empty command string or array".to_string(),
    };

    let value = crate::service::field(node, "command").ok_or_else(empty)?;
    let words: Vec<String> = match value {
        Value::String(command) => command.split_whitespace().map(str::to_string).collect(),
        Value::Sequence(seq) => seq
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(empty))
            .collect::<Result<_, _>>()?,
        _ => return Err(empty()),
    };
    let (command, argv) = words.split_first().ok_or_else(empty)?;

    Ok(Arc::new(ExecProbe {
        path,
        command: command.clone(),
        argv: argv.to_vec(),
    }))
}

#[async_trait]
impl Probe for ExecProbe {
    fn check_register(&self, _value: &str, _rtype: RecordType) -> Result<(), MonitorError> {
        Ok(())
    }

    async fn run(&self, value: &str, _rtype: RecordType) -> bool {
        let argv: Vec<String> = self
            .argv
            .iter()
            .map(|arg| {
                if arg == ITEM_TOKEN {
                    value.to_string()
                } else {
                    arg.clone()
                }
            })
            .collect();

        Command::new(&self.command)
            .args(&argv)
            .kill_on_drop(true)
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn path(&self) -> &str {
        &self.path
    }
}
