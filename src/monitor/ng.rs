// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Constant-NG probe, for diagnostics.

use std::sync::Arc;

use async_trait::async_trait;
use serde_yaml::Value;

use crate::monitor::{MonitorError, Probe};
use crate::rr::RecordType;

pub struct NgProbe {
    path: String,
}

pub fn new(path: String, _node: &Value) -> Result<Arc<dyn Probe>, MonitorError> {
    Ok(Arc::new(NgProbe { path }))
}

#[async_trait]
impl Probe for NgProbe {
    fn check_register(&self, _value: &str, _rtype: RecordType) -> Result<(), MonitorError> {
        Ok(())
    }

    async fn run(&self, _value: &str, _rtype: RecordType) -> bool {
        false
    }

    fn path(&self) -> &str {
        &self.path
    }
}
