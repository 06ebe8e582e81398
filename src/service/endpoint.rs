// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Endpoint: the leaf service node.
//!
//! An endpoint holds one prebuilt record for a single static value. The
//! record's owner, class and TTL are placeholders; the resolver rewrites
//! them from the dynamic record that referenced the service. Health is a
//! shared atomic flag: the producing monitor entry publishes transitions on
//! the status channel, a watch task stores them, and evaluation reads the
//! flag without locking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_yaml::Value;
use tokio::sync::mpsc;

use crate::name::{fqdn, ip_family, is_domain_name};
use crate::rr::{Record, RecordClass, RecordData, RecordType};
use crate::service::{
    str_field, EndpointWatch, MonitorBinding, RequestContext, ServiceBuild, ServiceError,
    ServiceNode, ServicePlugins, STATUS_CHANNEL_CAPACITY,
};

pub struct Endpoint {
    value: String,
    record: Record,
    path: String,
    status: Arc<AtomicBool>,
}

/// Builds an endpoint node, validating the value against the service's
/// declared RR type and registering a monitor binding when one is named.
pub fn new(
    _plugins: &ServicePlugins,
    build: &mut ServiceBuild,
    path: String,
    node: &Value,
) -> Result<Box<dyn ServiceNode>, ServiceError> {
    let value = str_field(node, "value").ok_or_else(|| ServiceError::Config {
        path: path.clone(),
        reason: "missing 'value'".to_string(),
    })?;

    let data = parse_value(build.rtype, &value).ok_or_else(|| ServiceError::Config {
        path: path.clone(),
        reason: format!("'{value}' is not a valid {} value", build.rtype),
    })?;
    let record = Record {
        name: ".".to_string(),
        class: RecordClass::IN,
        rtype: build.rtype,
        ttl: 0,
        data,
    };

    // Up until the monitoring manager says otherwise.
    let status = Arc::new(AtomicBool::new(true));

    if let Some(monitor) = str_field(node, "monitor") {
        let (status_tx, rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
        build.bindings.push(MonitorBinding {
            monitor,
            endpoint_path: path.clone(),
            value: value.clone(),
            rtype: build.rtype,
            status: Arc::clone(&status),
            status_tx,
        });
        build.watches.push(EndpointWatch {
            status: Arc::clone(&status),
            rx,
        });
    }

    Ok(Box::new(Endpoint {
        value,
        record,
        path,
        status,
    }))
}

impl Endpoint {
    /// The configured value string.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl ServiceNode for Endpoint {
    fn get_records(&self, _request: &RequestContext) -> Result<Vec<Record>, ServiceError> {
        if self.status.load(Ordering::Relaxed) {
            Ok(vec![self.record.clone()])
        } else {
            Err(ServiceError::StatusFailed)
        }
    }

    fn path(&self) -> &str {
        &self.path
    }
}

/// Parses an endpoint value into rdata for the declared type.
fn parse_value(rtype: RecordType, value: &str) -> Option<RecordData> {
    match rtype {
        RecordType::A => {
            if ip_family(value) != Some(4) {
                return None;
            }
            Some(RecordData::A(value.parse().ok()?))
        }
        RecordType::AAAA => {
            if ip_family(value) != Some(6) {
                return None;
            }
            Some(RecordData::Aaaa(value.parse().ok()?))
        }
        RecordType::CNAME => {
            is_domain_name(value).then(|| RecordData::Cname(fqdn(value)))
        }
        RecordType::PTR => is_domain_name(value).then(|| RecordData::Ptr(fqdn(value))),
        RecordType::TXT => {
            (value.len() <= 254).then(|| RecordData::Txt(vec![value.to_string()]))
        }
        RecordType::MX => {
            let mut parts = value.split_whitespace();
            let preference = parts.next()?.parse().ok()?;
            let exchange = parts.next()?;
            if parts.next().is_some() || !is_domain_name(exchange) {
                return None;
            }
            Some(RecordData::Mx {
                preference,
                exchange: fqdn(exchange),
            })
        }
        RecordType::SRV => {
            let parts: Vec<&str> = value.split_whitespace().collect();
            if parts.len() != 4 || !is_domain_name(parts[3]) {
                return None;
            }
            Some(RecordData::Srv {
                priority: parts[0].parse().ok()?,
                weight: parts[1].parse().ok()?,
                port: parts[2].parse().ok()?,
                target: fqdn(parts[3]),
            })
        }
        _ => None,
    }
}
