// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reload behaviour: idempotence, mtime gating and reference-counted
//! deletion across the three registries.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use crate::config::Config;
use crate::monitor::MonitorPlugins;
use crate::server::ServerState;
use crate::service::ServicePlugins;

const ZONE: &str = "$ORIGIN example.jp.\n$TTL 300\n@ IN SOA ns1.example.jp. h.example.jp. 1 2 3 4 5\n@ IN NS ns1.example.jp.\nwww IN DYNA www\n";

struct Fixture {
    state: Arc<ServerState>,
    dir: TempDir,
}

impl Fixture {
    fn zones_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("zones")
    }
    fn services_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("services")
    }

    async fn reload(&self) {
        let cfg = self.state.config();
        self.state
            .monitoring
            .load_monitors(&cfg.monitors_dir)
            .await
            .unwrap();
        self.state
            .services
            .load_services(&cfg.services_dir, &self.state.monitoring)
            .await
            .unwrap();
        self.state
            .zones
            .load_zones(&cfg.zones_dir, &self.state.services)
            .unwrap();
        self.state.zones.delete_zones(&self.state.services);
        self.state.services.delete_services(&self.state.monitoring);
        self.state.monitoring.delete_monitors();
    }
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
    std::fs::write(monitors.join("up.yml"), "monitor:\n  type: ok\n").unwrap();

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
    let fixture = Fixture { state, dir };
    fixture.reload().await;
    fixture
}

#[tokio::test(start_paused = true)]
async fn test_initial_load_populates_registries() {
    let fixture = setup().await;
    assert_eq!(fixture.state.zones.zone_names(), vec!["example.jp."]);
    assert_eq!(fixture.state.services.service_names(), vec!["www"]);
    assert_eq!(fixture.state.monitoring.monitor_names(), vec!["up"]);
    assert_eq!(fixture.state.monitoring.entry_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reload_without_changes_is_idempotent() {
    let fixture = setup().await;
    let service_before = fixture.state.services.get("www").unwrap();
    let tree_before = fixture.state.zones.zone_tree("example.jp.").unwrap();

    fixture.reload().await;

    // Unchanged mtimes: nothing was rebuilt, nothing restarted.
    let service_after = fixture.state.services.get("www").unwrap();
    let tree_after = fixture.state.zones.zone_tree("example.jp.").unwrap();
    assert!(Arc::ptr_eq(&service_before, &service_after));
    assert!(Arc::ptr_eq(&tree_before, &tree_after));
    assert_eq!(fixture.state.monitoring.entry_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_zone_change_swaps_tree() {
    let fixture = setup().await;
    let tree_before = fixture.state.zones.zone_tree("example.jp.").unwrap();

    let path = fixture.zones_dir().join("example.jp");
    std::fs::write(&path, ZONE.replace("h.example.jp. 1", "h.example.jp. 2")).unwrap();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();

    fixture.reload().await;

    let tree_after = fixture.state.zones.zone_tree("example.jp.").unwrap();
    assert!(!Arc::ptr_eq(&tree_before, &tree_after));
}

#[tokio::test(start_paused = true)]
async fn test_zone_with_unknown_service_keeps_previous_tree() {
    let fixture = setup().await;
    let tree_before = fixture.state.zones.zone_tree("example.jp.").unwrap();

    let path = fixture.zones_dir().join("example.jp");
    std::fs::write(&path, ZONE.replace("DYNA www", "DYNA missing")).unwrap();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(5)).unwrap();

    let cfg = fixture.state.config();
    assert!(fixture
        .state
        .zones
        .load_zones(&cfg.zones_dir, &fixture.state.services)
        .is_err());

    // The broken load left the old tree serving.
    let tree_after = fixture.state.zones.zone_tree("example.jp.").unwrap();
    assert!(Arc::ptr_eq(&tree_before, &tree_after));
}

#[tokio::test(start_paused = true)]
async fn test_referenced_service_survives_file_removal() {
    let fixture = setup().await;

    std::fs::remove_file(fixture.services_dir().join("www.yml")).unwrap();
    fixture.reload().await;

    // The zone still references the service, so it must not be deleted.
    assert_eq!(fixture.state.services.service_names(), vec!["www"]);
    assert_eq!(fixture.state.monitoring.entry_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unreferenced_service_and_monitor_are_deleted() {
    let fixture = setup().await;

    std::fs::remove_file(fixture.services_dir().join("www.yml")).unwrap();
    std::fs::remove_file(fixture.zones_dir().join("example.jp")).unwrap();
    fixture.reload().await;

    assert!(fixture.state.zones.zone_names().is_empty());
    assert!(fixture.state.services.service_names().is_empty());
    assert_eq!(fixture.state.monitoring.entry_count(), 0);

    // The monitor is unreferenced now; the next pass removes it.
    std::fs::remove_file(fixture.dir.path().join("monitors").join("up.yml")).unwrap();
    fixture.reload().await;
    assert!(fixture.state.monitoring.monitor_names().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_reflects_entry_status() {
    let fixture = setup().await;
    let snapshot = fixture.state.monitoring.snapshot();
    assert_eq!(
        crate::state::lookup(&snapshot, "up", "www", "service"),
        Some(true)
    );
}
