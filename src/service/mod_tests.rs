// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the service tree: construction dispatch, multivalue,
//! failover, geolocation matching and the file loader.

use std::io::Write;
use std::sync::atomic::Ordering;

use serde_yaml::Value;

use crate::rr::{RecordData, RecordType};
use crate::service::geolocation::{match_location, GeoRecord};
use crate::service::{
    load_service, service_name, RequestContext, ServiceBuild, ServiceError, ServiceNode,
    ServicePlugins,
};

fn build(
    rtype: RecordType,
    yaml: &str,
) -> (Result<Box<dyn ServiceNode>, ServiceError>, ServiceBuild) {
    let plugins = ServicePlugins::standard();
    let mut state = ServiceBuild {
        rtype,
        bindings: Vec::new(),
        watches: Vec::new(),
    };
    let node: Value = serde_yaml::from_str(yaml).unwrap();
    let result = plugins.create(&mut state, "service".to_string(), &node);
    (result, state)
}

fn request() -> RequestContext {
    RequestContext {
        query_id: 0,
        remote: "127.0.0.1:5353".parse().unwrap(),
        ecs: Vec::new(),
    }
}

#[test]
fn test_unknown_node_type_rejected() {
    let (result, _) = build(RecordType::A, "type: bogus\n");
    assert!(matches!(result, Err(ServiceError::UnknownKind { .. })));
}

#[test]
fn test_type_dispatch_is_case_insensitive() {
    let (result, _) = build(RecordType::A, "type: EndPoint\nvalue: 192.0.2.1\n");
    assert!(result.is_ok());
}

#[test]
fn test_multivalue_unions_healthy_children() {
    let yaml = r#"
type: multivalue
values:
  a:
    type: endpoint
    value: 192.0.2.1
    monitor: web
  b:
    type: endpoint
    value: 192.0.2.2
    monitor: web
"#;
    let (node, state) = build(RecordType::A, yaml);
    let node = node.unwrap();

    let records = node.get_records(&request()).unwrap();
    assert_eq!(records.len(), 2);

    // One child down: its record drops out silently.
    state
        .bindings
        .iter()
        .find(|b| b.endpoint_path.contains(".values.a"))
        .unwrap()
        .status
        .store(false, Ordering::Relaxed);
    let records = node.get_records(&request()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].data, RecordData::A("192.0.2.2".parse().unwrap()));

    // All children down: the node itself is unhealthy.
    for binding in &state.bindings {
        binding.status.store(false, Ordering::Relaxed);
    }
    assert_eq!(node.get_records(&request()), Err(ServiceError::StatusFailed));
}

#[test]
fn test_failover_prefers_lowest_priority() {
    let yaml = r#"
type: failover
values:
  primary:
    priority: 1
    next:
      type: endpoint
      value: 192.0.2.1
      monitor: web
  backup:
    priority: 2
    next:
      type: endpoint
      value: 192.0.2.2
      monitor: web
"#;
    let (node, state) = build(RecordType::A, yaml);
    let node = node.unwrap();

    let records = node.get_records(&request()).unwrap();
    assert_eq!(records[0].data, RecordData::A("192.0.2.1".parse().unwrap()));

    // Primary down: the backup answers.
    state
        .bindings
        .iter()
        .find(|b| b.endpoint_path.contains(".values.primary"))
        .unwrap()
        .status
        .store(false, Ordering::Relaxed);
    let records = node.get_records(&request()).unwrap();
    assert_eq!(records[0].data, RecordData::A("192.0.2.2".parse().unwrap()));
}

#[test]
fn test_failover_duplicate_priority_rejected() {
    let yaml = r#"
type: failover
values:
  x:
    priority: 1
    next:
      type: endpoint
      value: 192.0.2.1
  y:
    priority: 1
    next:
      type: endpoint
      value: 192.0.2.2
"#;
    let (node, _) = build(RecordType::A, yaml);
    assert!(matches!(node, Err(ServiceError::Config { .. })));
}

#[test]
fn test_geolocation_requires_database_and_default() {
    let yaml = r#"
type: geolocation
locations:
  DEFAULT:
    type: endpoint
    value: 192.0.2.99
"#;
    let (node, _) = build(RecordType::A, yaml);
    assert!(matches!(node, Err(ServiceError::Config { .. })));

    let yaml = r#"
type: geolocation
geodbfile: /nonexistent/GeoIP2-City.mmdb
locations:
  DEFAULT:
    type: endpoint
    value: 192.0.2.99
"#;
    let (node, _) = build(RecordType::A, yaml);
    assert!(matches!(node, Err(ServiceError::Config { .. })));
}

#[test]
fn test_geolocation_match_order() {
    let record = GeoRecord {
        subdivisions: vec!["ENG".to_string()],
        country: Some("GB".to_string()),
        continent: Some("EU".to_string()),
    };

    // Subdivision beats country beats continent.
    let keys = ["ENG", "GB", "EU"];
    assert_eq!(
        match_location(&record, |k| keys.contains(&k)),
        Some("ENG".to_string())
    );
    let keys = ["GB", "EU"];
    assert_eq!(
        match_location(&record, |k| keys.contains(&k)),
        Some("GB".to_string())
    );
    let keys = ["EU"];
    assert_eq!(
        match_location(&record, |k| keys.contains(&k)),
        Some("EU".to_string())
    );
    assert_eq!(match_location(&record, |_| false), None);
}

#[test]
fn test_load_service_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("www.yml");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        "rrtype: A\nservice:\n  type: endpoint\n  value: 192.0.2.1\n  monitor: web\n"
    )
    .unwrap();

    let plugins = ServicePlugins::standard();
    let loaded = load_service(&path, &plugins).unwrap();
    assert_eq!(loaded.config.name, "www");
    assert_eq!(loaded.config.rtype, RecordType::A);
    assert_eq!(loaded.config.bindings.len(), 1);
    assert_eq!(loaded.watches.len(), 1);
    assert!(loaded.config.root.get_records(&request()).is_ok());
}

#[test]
fn test_load_service_rejects_unsupported_rrtype() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yml");
    let mut file = std::fs::File::create(&path).unwrap();
    // NS has no dynamic counterpart.
    write!(file, "rrtype: NS\nservice:\n  type: endpoint\n  value: x\n").unwrap();

    let plugins = ServicePlugins::standard();
    assert!(matches!(
        load_service(&path, &plugins),
        Err(ServiceError::UnsupportedRrtype { .. })
    ));
}

#[test]
fn test_service_name_strips_suffix() {
    assert_eq!(service_name(std::path::Path::new("/etc/warren/services/www.yml")), "www");
    assert_eq!(service_name(std::path::Path::new("plain")), "plain");
}
