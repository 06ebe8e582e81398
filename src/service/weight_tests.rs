// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `service/weight.rs`

use std::net::Ipv4Addr;
use std::sync::atomic::Ordering;

use serde_yaml::Value;

use crate::rr::{RecordData, RecordType};
use crate::service::{RequestContext, ServiceBuild, ServiceError, ServiceNode, ServicePlugins};

const WEIGHT_YAML: &str = r#"
type: weight
values:
  a:
    weight: 10
    next:
      type: endpoint
      value: 192.0.2.1
      monitor: web
  b:
    weight: 20
    next:
      type: endpoint
      value: 192.0.2.2
      monitor: web
"#;

fn build(yaml: &str) -> (Result<Box<dyn ServiceNode>, ServiceError>, ServiceBuild) {
    let plugins = ServicePlugins::standard();
    let mut state = ServiceBuild {
        rtype: RecordType::A,
        bindings: Vec::new(),
        watches: Vec::new(),
    };
    let node: Value = serde_yaml::from_str(yaml).unwrap();
    let result = plugins.create(&mut state, "service".to_string(), &node);
    (result, state)
}

fn request(query_id: u16) -> RequestContext {
    RequestContext {
        query_id,
        remote: "127.0.0.1:5353".parse().unwrap(),
        ecs: Vec::new(),
    }
}

fn answered_ip(node: &dyn ServiceNode, query_id: u16) -> Ipv4Addr {
    match node.get_records(&request(query_id)).unwrap()[0].data {
        RecordData::A(ip) => ip,
        ref other => panic!("unexpected rdata {other:?}"),
    }
}

#[test]
fn test_weight_bands_are_deterministic() {
    let (weight, _) = build(WEIGHT_YAML);
    let weight = weight.unwrap();

    // Children are banded in sorted-name order: ids 0..10 land in a's
    // band, 10..30 in b's, and the pattern repeats modulo 30.
    let a: Ipv4Addr = "192.0.2.1".parse().unwrap();
    let b: Ipv4Addr = "192.0.2.2".parse().unwrap();
    for id in 0..10u16 {
        assert_eq!(answered_ip(weight.as_ref(), id), a, "id {id}");
    }
    for id in 10..30u16 {
        assert_eq!(answered_ip(weight.as_ref(), id), b, "id {id}");
    }
    assert_eq!(answered_ip(weight.as_ref(), 30), a);
    assert_eq!(answered_ip(weight.as_ref(), 12345 % 30), answered_ip(weight.as_ref(), 12345));
}

#[test]
fn test_weight_skips_unhealthy_children() {
    let (weight, state) = build(WEIGHT_YAML);
    let weight = weight.unwrap();

    // Take child a down; every id now lands in b's band of the reduced sum.
    let a_binding = state
        .bindings
        .iter()
        .find(|b| b.endpoint_path.contains(".values.a."))
        .unwrap();
    a_binding.status.store(false, Ordering::Relaxed);

    let b: Ipv4Addr = "192.0.2.2".parse().unwrap();
    for id in 0..40u16 {
        assert_eq!(answered_ip(weight.as_ref(), id), b);
    }
}

#[test]
fn test_weight_all_down_is_status_failed() {
    let (weight, state) = build(WEIGHT_YAML);
    let weight = weight.unwrap();
    for binding in &state.bindings {
        binding.status.store(false, Ordering::Relaxed);
    }
    assert_eq!(
        weight.get_records(&request(7)),
        Err(ServiceError::StatusFailed)
    );
}

#[test]
fn test_weight_zero_rejected() {
    let yaml = r#"
type: weight
values:
  a:
    weight: 0
    next:
      type: endpoint
      value: 192.0.2.1
"#;
    let (weight, _) = build(yaml);
    assert!(matches!(weight, Err(ServiceError::Config { .. })));
}

#[test]
fn test_weight_over_255_rejected() {
    let yaml = r#"
type: weight
values:
  a:
    weight: 300
    next:
      type: endpoint
      value: 192.0.2.1
"#;
    let (weight, _) = build(yaml);
    assert!(matches!(weight, Err(ServiceError::Config { .. })));
}
