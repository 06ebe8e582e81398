// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Multivalue: union of every healthy child's answers.

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::rr::Record;
use crate::service::{
    field, RequestContext, ServiceBuild, ServiceError, ServiceNode, ServicePlugins,
};

pub struct Multivalue {
    values: BTreeMap<String, Box<dyn ServiceNode>>,
    path: String,
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
        let next = plugins.create(build, child_path, child)?;
        values.insert(child_name.to_uppercase(), next);
    }

    Ok(Box::new(Multivalue { values, path }))
}

impl ServiceNode for Multivalue {
    /// Concatenates the records of every child that evaluates successfully;
    /// when no child does, the whole node is unhealthy.
    fn get_records(&self, request: &RequestContext) -> Result<Vec<Record>, ServiceError> {
        let mut records = Vec::new();
        let mut healthy = false;
        for child in self.values.values() {
            if let Ok(child_records) = child.get_records(request) {
                healthy = true;
                records.extend(child_records);
            }
        }
        if healthy {
            Ok(records)
        } else {
            Err(ServiceError::StatusFailed)
        }
    }

    fn path(&self) -> &str {
        &self.path
    }
}
