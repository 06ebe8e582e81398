// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resolver tests: full query handling against a loaded state, without
//! sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::config::Config;
use crate::monitor::MonitorPlugins;
use crate::rr::{Record, RecordClass, RecordData, RecordType};
use crate::server::worker::{handle_packet, Proto};
use crate::server::ServerState;
use crate::service::ServicePlugins;
use crate::wire::{rcode, Flags, Message, Question};

const ZONE: &str = r#"$ORIGIN example.jp.
$TTL 300
@ IN SOA ns1.example.jp. hostmaster.example.jp. 1 3600 900 1814400 900
@ IN NS ns1.example.jp.
ns1 IN A 192.0.2.53
www IN DYNA www
down IN DYNA downsvc
alias IN CNAME target
target IN A 192.0.2.5
*.w IN A 192.0.2.7
sub IN NS ns.sub.example.jp.
ns.sub IN A 192.0.2.77
"#;

struct Fixture {
    state: Arc<ServerState>,
    _dir: TempDir,
}

async fn setup() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let zones = dir.path().join("zones");
    let services = dir.path().join("services");
    let monitors = dir.path().join("monitors");
    for sub in [&zones, &services, &monitors] {
        std::fs::create_dir(sub).unwrap();
    }

    std::fs::write(zones.join("example.jp"), ZONE).unwrap();
    std::fs::write(
        services.join("www.yml"),
        "rrtype: A\nservice:\n  type: endpoint\n  value: 192.0.2.1\n  monitor: up\n",
    )
    .unwrap();
    std::fs::write(
        services.join("downsvc.yml"),
        "rrtype: A\nservice:\n  type: endpoint\n  value: 192.0.2.9\n  monitor: down\n",
    )
    .unwrap();
    std::fs::write(monitors.join("up.yml"), "monitor:\n  type: ok\n").unwrap();
    std::fs::write(monitors.join("down.yml"), "monitor:\n  type: ng\n").unwrap();

    let config = Config {
        zones_dir: zones,
        services_dir: services,
        monitors_dir: monitors,
        state_file: dir.path().join("state.dat"),
        ..Config::default()
    };
    let state = ServerState::new(
        config,
        ServicePlugins::standard(),
        MonitorPlugins::standard(),
    );

    let cfg = state.config();
    state.monitoring.load_monitors(&cfg.monitors_dir).await.unwrap();
    state
        .services
        .load_services(&cfg.services_dir, &state.monitoring)
        .await
        .unwrap();
    state.zones.load_zones(&cfg.zones_dir, &state.services).unwrap();

    // Let the endpoint watch tasks drain the seeded statuses.
    tokio::time::sleep(Duration::from_millis(50)).await;

    Fixture { state, _dir: dir }
}

fn peer() -> SocketAddr {
    "192.0.2.200:5353".parse().unwrap()
}

fn query(name: &str, qtype: RecordType) -> Vec<u8> {
    query_class(name, qtype, RecordClass::IN)
}

fn query_class(name: &str, qtype: RecordType, qclass: RecordClass) -> Vec<u8> {
    Message {
        id: 4660,
        flags: Flags {
            rd: true,
            ..Flags::default()
        },
        questions: vec![Question {
            name: name.to_string(),
            qtype,
            qclass,
        }],
        ..Message::default()
    }
    .to_bytes()
    .unwrap()
}

async fn ask(fixture: &Fixture, packet: &[u8]) -> Message {
    let reply = handle_packet(&fixture.state, packet, peer(), Proto::Udp)
        .await
        .expect("a reply");
    Message::from_bytes(&reply).unwrap()
}

fn has_apex_ns(records: &[Record]) -> bool {
    records
        .iter()
        .any(|rr| rr.rtype == RecordType::NS && rr.name == "example.jp.")
}

fn has_soa(records: &[Record]) -> bool {
    records.iter().any(|rr| rr.rtype == RecordType::SOA)
}

#[tokio::test(start_paused = true)]
async fn test_healthy_dynamic_endpoint() {
    let fixture = setup().await;
    let reply = ask(&fixture, &query("www.example.jp.", RecordType::A)).await;

    assert!(reply.flags.aa);
    assert_eq!(reply.flags.rcode, rcode::NOERROR);
    assert_eq!(reply.answers.len(), 1);
    let answer = &reply.answers[0];
    assert_eq!(answer.name, "www.example.jp.");
    assert_eq!(answer.rtype, RecordType::A);
    assert_eq!(answer.ttl, 300);
    assert_eq!(answer.data, RecordData::A("192.0.2.1".parse().unwrap()));
    assert!(has_apex_ns(&reply.authority));
}

#[tokio::test(start_paused = true)]
async fn test_down_dynamic_endpoint_is_empty_noerror() {
    let fixture = setup().await;
    let reply = ask(&fixture, &query("down.example.jp.", RecordType::A)).await;

    assert!(reply.flags.aa);
    assert_eq!(reply.flags.rcode, rcode::NOERROR);
    assert!(reply.answers.is_empty());
    assert!(has_soa(&reply.authority));
}

#[tokio::test(start_paused = true)]
async fn test_cname_chase() {
    let fixture = setup().await;
    let reply = ask(&fixture, &query("alias.example.jp.", RecordType::A)).await;

    assert!(reply.flags.aa);
    assert_eq!(reply.flags.rcode, rcode::NOERROR);
    assert_eq!(reply.answers.len(), 2);
    assert_eq!(
        reply.answers[0].data,
        RecordData::Cname("target.example.jp.".to_string())
    );
    assert_eq!(reply.answers[1].name, "target.example.jp.");
    assert_eq!(reply.answers[1].data, RecordData::A("192.0.2.5".parse().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn test_wildcard_owner_rewrite() {
    let fixture = setup().await;
    let reply = ask(&fixture, &query("foo.w.example.jp.", RecordType::A)).await;

    assert!(reply.flags.aa);
    assert_eq!(reply.flags.rcode, rcode::NOERROR);
    assert_eq!(reply.answers.len(), 1);
    assert_eq!(reply.answers[0].name, "foo.w.example.jp.");
    assert_eq!(reply.answers[0].data, RecordData::A("192.0.2.7".parse().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn test_delegation_referral() {
    let fixture = setup().await;
    let reply = ask(&fixture, &query("x.sub.example.jp.", RecordType::A)).await;

    assert!(!reply.flags.aa);
    assert!(reply.answers.is_empty());
    assert_eq!(reply.authority.len(), 1);
    assert_eq!(reply.authority[0].name, "sub.example.jp.");
    assert_eq!(
        reply.authority[0].data,
        RecordData::Ns("ns.sub.example.jp.".to_string())
    );
    // Glue for the delegated name server.
    assert!(reply
        .additional
        .iter()
        .any(|rr| rr.name == "ns.sub.example.jp."
            && rr.data == RecordData::A("192.0.2.77".parse().unwrap())));
}

#[tokio::test(start_paused = true)]
async fn test_nxdomain_negative_answer() {
    let fixture = setup().await;
    let reply = ask(&fixture, &query("nope.example.jp.", RecordType::A)).await;

    assert!(reply.flags.aa);
    assert_eq!(reply.flags.rcode, rcode::NXDOMAIN);
    assert!(reply.answers.is_empty());
    assert!(has_soa(&reply.authority));
}

#[tokio::test(start_paused = true)]
async fn test_out_of_zone_is_refused() {
    let fixture = setup().await;
    let reply = ask(&fixture, &query("www.example.com.", RecordType::A)).await;
    assert_eq!(reply.flags.rcode, rcode::REFUSED);
}

#[tokio::test(start_paused = true)]
async fn test_apex_ns_query_has_no_ns_stapling() {
    let fixture = setup().await;
    let reply = ask(&fixture, &query("example.jp.", RecordType::NS)).await;

    assert!(reply.flags.aa);
    assert_eq!(reply.flags.rcode, rcode::NOERROR);
    assert_eq!(reply.answers.len(), 1);
    assert!(reply.authority.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_chaos_version_bind() {
    let fixture = setup().await;
    let reply = ask(
        &fixture,
        &query_class("version.bind.", RecordType::TXT, RecordClass::CH),
    )
    .await;

    assert_eq!(reply.flags.rcode, rcode::NOERROR);
    assert_eq!(reply.answers.len(), 1);
    assert_eq!(
        reply.answers[0].data,
        RecordData::Txt(vec![env!("CARGO_PKG_VERSION").to_string()])
    );

    let reply = ask(
        &fixture,
        &query_class("hostname.bind.", RecordType::TXT, RecordClass::CH),
    )
    .await;
    assert_eq!(
        reply.answers[0].data,
        RecordData::Txt(vec!["localhost.".to_string()])
    );

    let reply = ask(
        &fixture,
        &query_class("other.name.", RecordType::TXT, RecordClass::CH),
    )
    .await;
    assert_eq!(reply.flags.rcode, rcode::NXRRSET);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_class_not_implemented() {
    let fixture = setup().await;
    let reply = ask(
        &fixture,
        &query_class("www.example.jp.", RecordType::A, RecordClass(42)),
    )
    .await;
    assert_eq!(reply.flags.rcode, rcode::NOTIMP);
}

#[tokio::test(start_paused = true)]
async fn test_reload_race_consistency() {
    let fixture = setup().await;
    let state = Arc::clone(&fixture.state);

    // Fire a batch of concurrent queries while the zone tree is being
    // replaced; every reply must be complete and SERVFAIL-free.
    let cfg = state.config();
    let zones_dir = cfg.zones_dir.clone();
    let reload_state = Arc::clone(&state);
    let reload = tokio::spawn(async move {
        for serial in 2..20u32 {
            let text = ZONE.replace(
                "hostmaster.example.jp. 1",
                &format!("hostmaster.example.jp. {serial}"),
            );
            let path = zones_dir.join("example.jp");
            std::fs::write(&path, text).unwrap();
            let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
            file.set_modified(std::time::SystemTime::now() + Duration::from_secs(u64::from(serial)))
                .unwrap();
            reload_state
                .zones
                .read_zone(&path, &reload_state.services)
                .unwrap();
            tokio::task::yield_now().await;
        }
    });

    let mut queries = Vec::new();
    for _ in 0..200 {
        let state = Arc::clone(&state);
        queries.push(tokio::spawn(async move {
            let packet = query("www.example.jp.", RecordType::A);
            let reply = handle_packet(&state, &packet, peer(), Proto::Udp)
                .await
                .expect("a reply");
            let reply = Message::from_bytes(&reply).unwrap();
            assert_ne!(reply.flags.rcode, rcode::SERVFAIL);
            assert_eq!(reply.answers.len(), 1);
        }));
    }
    for q in queries {
        q.await.unwrap();
    }
    reload.await.unwrap();
}
