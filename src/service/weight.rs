// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Weight: weighted selection among healthy children.
//!
//! Selection is deterministic for a given query id: children are banded in
//! sorted-name order and the band containing `query_id mod sum(weights of
//! healthy children)` wins. Unhealthy children drop out of the sum, so
//! traffic re-spreads over the survivors instead of disappearing.

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::rr::Record;
use crate::service::{
    field, u64_field, RequestContext, ServiceBuild, ServiceError, ServiceNode, ServicePlugins,
};

pub struct Weight {
    values: BTreeMap<String, WeightChild>,
    path: String,
}

pub struct WeightChild {
    pub weight: u8,
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

    let mut values = BTreeMap::new();
    for (key, child) in values_node {
        let child_name = key.as_str().ok_or_else(|| ServiceError::Config {
            path: path.clone(),
            reason: "child names must be strings".to_string(),
        })?;
        let child_path = format!("{path}.values.{}", child_name.to_lowercase());

        let weight = u64_field(child, "weight").unwrap_or(0);
        if weight == 0 || weight > u64::from(u8::MAX) {
            return Err(ServiceError::Config {
                path: child_path,
                reason: format!("weight must be 1-255, got {weight}"),
            });
        }
        let next_node = field(child, "next").ok_or_else(|| ServiceError::Config {
            path: child_path.clone(),
            reason: "missing 'next'".to_string(),
        })?;
        let next = plugins.create(build, format!("{child_path}.next"), next_node)?;
        values.insert(
            child_name.to_uppercase(),
            WeightChild {
                weight: weight as u8,
                next,
            },
        );
    }

    Ok(Box::new(Weight { values, path }))
}

impl ServiceNode for Weight {
    fn get_records(&self, request: &RequestContext) -> Result<Vec<Record>, ServiceError> {
        // Evaluate every child first; only successful ones take part in
        // the weighted pick.
        let mut candidates: Vec<(&WeightChild, Vec<Record>)> = Vec::new();
        let mut sum: u16 = 0;
        for child in self.values.values() {
            if let Ok(records) = child.next.get_records(request) {
                sum += u16::from(child.weight);
                candidates.push((child, records));
            }
        }
        if sum == 0 {
            return Err(ServiceError::StatusFailed);
        }

        let mut slot = request.query_id % sum;
        for (child, records) in candidates {
            if slot < u16::from(child.weight) {
                return Ok(records);
            }
            slot -= u16::from(child.weight);
        }
        // slot < sum, so a band always matched above.
        Err(ServiceError::StatusFailed)
    }

    fn path(&self) -> &str {
        &self.path
    }
}
