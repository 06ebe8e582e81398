// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `service/endpoint.rs`

use std::sync::atomic::Ordering;

use serde_yaml::Value;

use crate::rr::{RecordData, RecordType};
use crate::service::{RequestContext, ServiceBuild, ServiceError, ServicePlugins};

fn build_endpoint(
    rtype: RecordType,
    yaml: &str,
) -> (
    Result<Box<dyn crate::service::ServiceNode>, ServiceError>,
    ServiceBuild,
) {
    let plugins = ServicePlugins::standard();
    let mut build = ServiceBuild {
        rtype,
        bindings: Vec::new(),
        watches: Vec::new(),
    };
    let node: Value = serde_yaml::from_str(yaml).unwrap();
    let result = plugins.create(&mut build, "service".to_string(), &node);
    (result, build)
}

fn request() -> RequestContext {
    RequestContext {
        query_id: 0,
        remote: "127.0.0.1:5353".parse().unwrap(),
        ecs: Vec::new(),
    }
}

#[test]
fn test_endpoint_a_answers_when_up() {
    let (endpoint, _) = build_endpoint(RecordType::A, "type: endpoint\nvalue: 192.0.2.1\n");
    let records = endpoint.unwrap().get_records(&request()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].data, RecordData::A("192.0.2.1".parse().unwrap()));
}

#[test]
fn test_endpoint_fails_when_down() {
    let yaml = "type: endpoint\nvalue: 192.0.2.1\nmonitor: web\n";
    let (endpoint, build) = build_endpoint(RecordType::A, yaml);
    let endpoint = endpoint.unwrap();

    assert_eq!(build.bindings.len(), 1);
    assert_eq!(build.bindings[0].monitor, "web");
    assert_eq!(build.bindings[0].endpoint_path, "service");

    build.bindings[0].status.store(false, Ordering::Relaxed);
    assert_eq!(
        endpoint.get_records(&request()),
        Err(ServiceError::StatusFailed)
    );
}

#[test]
fn test_endpoint_rejects_wrong_family() {
    let (endpoint, _) = build_endpoint(RecordType::A, "type: endpoint\nvalue: 2001:db8::1\n");
    assert!(matches!(endpoint, Err(ServiceError::Config { .. })));

    let (endpoint, _) = build_endpoint(RecordType::AAAA, "type: endpoint\nvalue: 192.0.2.1\n");
    assert!(matches!(endpoint, Err(ServiceError::Config { .. })));
}

#[test]
fn test_endpoint_mx_and_srv_values() {
    let (endpoint, _) = build_endpoint(
        RecordType::MX,
        "type: endpoint\nvalue: 10 mx.example.jp.\n",
    );
    let records = endpoint.unwrap().get_records(&request()).unwrap();
    assert_eq!(
        records[0].data,
        RecordData::Mx {
            preference: 10,
            exchange: "mx.example.jp.".to_string()
        }
    );

    let (endpoint, _) = build_endpoint(
        RecordType::SRV,
        "type: endpoint\nvalue: 10 20 5060 sip.example.jp\n",
    );
    let records = endpoint.unwrap().get_records(&request()).unwrap();
    assert_eq!(
        records[0].data,
        RecordData::Srv {
            priority: 10,
            weight: 20,
            port: 5060,
            target: "sip.example.jp.".to_string()
        }
    );

    let (endpoint, _) = build_endpoint(RecordType::MX, "type: endpoint\nvalue: tenmx\n");
    assert!(endpoint.is_err());
}

#[test]
fn test_endpoint_txt_length_limit() {
    let long = "x".repeat(255);
    let (endpoint, _) =
        build_endpoint(RecordType::TXT, &format!("type: endpoint\nvalue: {long}\n"));
    assert!(endpoint.is_err());
}

#[test]
fn test_unmonitored_endpoint_has_no_binding() {
    let (endpoint, build) = build_endpoint(RecordType::A, "type: endpoint\nvalue: 192.0.2.1\n");
    assert!(endpoint.is_ok());
    assert!(build.bindings.is_empty());
    assert!(build.watches.is_empty());
}
