// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! TCP-connect probe: up when a TCP dial to `value:port` succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use serde_yaml::Value;
use tokio::net::TcpStream;

use crate::monitor::{MonitorError, Probe};
use crate::rr::RecordType;
use crate::service::str_field;

pub struct Tcpcon {
    path: String,
    port: String,
}

pub fn new(path: String, node: &Value) -> Result<Arc<dyn Probe>, MonitorError> {
    let port = str_field(node, "port").ok_or_else(|| MonitorError::Config {
        path: path.clone(),
        reason: "missing 'port'".to_string(),
    })?;
    Ok(Arc::new(Tcpcon { path, port }))
}

/// The endpoint value with the configured port, IPv6 bracketed.
pub(crate) fn connect_target(value: &str, rtype: RecordType, port: &str) -> String {
    if rtype == RecordType::AAAA {
        format!("[{value}]:{port}")
    } else {
        format!("{value}:{port}")
    }
}

#[async_trait]
impl Probe for Tcpcon {
    fn check_register(&self, _value: &str, rtype: RecordType) -> Result<(), MonitorError> {
        match rtype {
            RecordType::A | RecordType::AAAA | RecordType::CNAME => Ok(()),
            other => Err(MonitorError::UnsupportedRrtype {
                probe: "tcpcon",
                rtype: other,
            }),
        }
    }

    async fn run(&self, value: &str, rtype: RecordType) -> bool {
        TcpStream::connect(connect_target(value, rtype, &self.port))
            .await
            .is_ok()
    }

    fn path(&self) -> &str {
        &self.path
    }
}
