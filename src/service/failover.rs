// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Failover: first healthy child in priority order wins.

use serde_yaml::Value;

use crate::rr::Record;
use crate::service::{
    field, u64_field, RequestContext, ServiceBuild, ServiceError, ServiceNode, ServicePlugins,
};

pub struct Failover {
    /// Children sorted by ascending priority; 1 is the most preferred.
    values: Vec<FailoverChild>,
    path: String,
}

struct FailoverChild {
    priority: u8,
    next: Box<dyn ServiceNode>,
}

pub fn new(
    plugins: &ServicePlugins,
    build: &mut ServiceBuild,
    path: String,
    node: &Value,
) -> Result<Box<dyn ServiceNode>, ServiceError> {
    let values_node = field(node, "values")
        .and_then(Value::as_mapping)
        .ok_or_else(|| ServiceError::Config {
            path: path.clone(),
            reason: "missing 'values' mapping".to_string(),
        })?;

    let mut values: Vec<FailoverChild> = Vec::new();
    for (key, child) in values_node {
        let child_name = key.as_str().ok_or_else(|| ServiceError::Config {
            path: path.clone(),
            reason: "child names must be strings".to_string(),
        })?;
        let child_path = format!("{path}.values.{}", child_name.to_lowercase());

        let priority = u64_field(child, "priority").unwrap_or(0);
        if priority == 0 || priority > u64::from(u8::MAX) {
            return Err(ServiceError::Config {
                path: child_path,
                reason: format!("priority must be 1-255 (1 is highest), got {priority}"),
            });
        }
        let priority = priority as u8;
        if values.iter().any(|v| v.priority == priority) {
            return Err(ServiceError::Config {
                path: child_path,
                reason: format!("duplicate priority {priority}"),
            });
        }
        let next_node = field(child, "next").ok_or_else(|| ServiceError::Config {
            path: child_path.clone(),
            reason: "missing 'next'".to_string(),
        })?;
        let next = plugins.create(build, format!("{child_path}.next"), next_node)?;

        let at = values.partition_point(|v| v.priority < priority);
        values.insert(at, FailoverChild { priority, next });
    }

    Ok(Box::new(Failover { values, path }))
}

impl ServiceNode for Failover {
    fn get_records(&self, request: &RequestContext) -> Result<Vec<Record>, ServiceError> {
        let mut last = ServiceError::StatusFailed;
        for child in &self.values {
            match child.next.get_records(request) {
                Ok(records) => return Ok(records),
                Err(err) => last = err,
            }
        }
        Err(last)
    }

    fn path(&self) -> &str {
        &self.path
    }
}
