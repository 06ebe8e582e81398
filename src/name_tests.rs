// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `name.rs`

use crate::name::{fqdn, ip_family, is_domain_name, labels};

#[test]
fn test_fqdn_normalisation() {
    assert_eq!(fqdn(""), ".");
    assert_eq!(fqdn("."), ".");
    assert_eq!(fqdn("example.jp"), "example.jp.");
    assert_eq!(fqdn("example.jp."), "example.jp.");
}

#[test]
fn test_labels_tokenisation() {
    assert_eq!(labels("www.example.jp."), vec!["www", "example", "jp"]);
    assert_eq!(labels("www.example.jp"), vec!["www", "example", "jp"]);
    assert!(labels(".").is_empty());
    assert!(labels("").is_empty());
}

#[test]
fn test_labels_lower_cases() {
    assert_eq!(labels("WWW.Example.JP."), vec!["www", "example", "jp"]);
}

#[test]
fn test_ip_family() {
    assert_eq!(ip_family("192.0.2.1"), Some(4));
    assert_eq!(ip_family("2001:db8::1"), Some(6));
    assert_eq!(ip_family("www.example.jp."), None);
}

#[test]
fn test_is_domain_name() {
    assert!(is_domain_name("www.example.jp."));
    assert!(is_domain_name("www.example.jp"));
    assert!(is_domain_name("*.w.example.jp."));
    assert!(is_domain_name("_sip._tcp.example.jp."));
    assert!(!is_domain_name(""));
    assert!(!is_domain_name("bad host.example.jp."));
    assert!(!is_domain_name("a..b.example.jp."));
}
