// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP probe: up when the configured request returns a 2xx response and,
//! when `check` is set, the body contains that substring.
//!
//! Every `%%ITEM%%` occurrence in the URL is replaced with the endpoint
//! value (bracketed for AAAA endpoints), so one monitor file serves many
//! endpoints.

use std::sync::Arc;

use async_trait::async_trait;
use serde_yaml::Value;

use crate::monitor::{MonitorError, Probe};
use crate::rr::RecordType;
use crate::service::str_field;

/// Placeholder substituted with the endpoint value.
const ITEM_TOKEN: &str = "%%ITEM%%";

const ALLOWED_METHODS: [&str; 9] = [
    "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "CONNECT", "OPTIONS", "TRACE",
];

pub struct Http {
    path: String,
    url: String,
    method: reqwest::Method,
    check: Option<String>,
    data: Option<String>,
    client: reqwest::Client,
}

pub fn new(path: String, node: &Value) -> Result<Arc<dyn Probe>, MonitorError> {
    let url = str_field(node, "url").ok_or_else(|| MonitorError::Config {
        path: path.clone(),
        reason: "missing 'url'".to_string(),
    })?;

    let method = str_field(node, "method")
        .unwrap_or_else(|| "GET".to_string())
        .to_uppercase();
    if !ALLOWED_METHODS.contains(&method.as_str()) {
        return Err(MonitorError::Config {
            path,
            reason: format!("unsupported http method '{method}'"),
        });
    }
    let method = reqwest::Method::from_bytes(method.as_bytes()).map_err(|e| {
        MonitorError::Config {
            path: path.clone(),
            reason: e.to_string(),
        }
    })?;

    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| MonitorError::Config {
            path: path.clone(),
            reason: e.to_string(),
        })?;

    Ok(Arc::new(Http {
        path,
        url,
        method,
        check: str_field(node, "check"),
        data: str_field(node, "data"),
        client,
    }))
}

#[async_trait]
impl Probe for Http {
    fn check_register(&self, _value: &str, rtype: RecordType) -> Result<(), MonitorError> {
        match rtype {
            RecordType::A | RecordType::AAAA | RecordType::CNAME => Ok(()),
            other => Err(MonitorError::UnsupportedRrtype {
                probe: "http",
                rtype: other,
            }),
        }
    }

    async fn run(&self, value: &str, rtype: RecordType) -> bool {
        let host = if rtype == RecordType::AAAA {
            format!("[{value}]")
        } else {
            value.to_string()
        };
        let url = self.url.replace(ITEM_TOKEN, &host);

        let mut request = self.client.request(self.method.clone(), url);
        if let Some(data) = &self.data {
            request = request.body(data.clone());
        }
        let Ok(response) = request.send().await else {
            return false;
        };
        if !response.status().is_success() {
            return false;
        }
        match &self.check {
            None => true,
            Some(needle) => response
                .text()
                .await
                .map(|body| body.contains(needle))
                .unwrap_or(false),
        }
    }

    fn path(&self) -> &str {
        &self.path
    }
}
