// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Master: startup orchestration and the reload controller.
//!
//! The master loads the three registries (monitors, then services, then
//! zones — each layer validates its references against the previous one),
//! binds every listener, then enters the reload loop. All registry
//! mutation is serialised by one async mutex; triggers are SIGHUP (full
//! reconfig), the control API's reload operations, and a periodic tick
//! honouring the auto-reload flags. Zone parsing happens outside any
//! registry lock; only the final metadata swap is locked.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{error, info, warn};

use crate::config::{load_config, Config};
use crate::server::{control, worker::Worker, ServerState};
use crate::state;

/// Period of the auto-reload tick.
const RELOAD_TICK: Duration = Duration::from_secs(10);
/// Capacity of the control-command channel.
const CONTROL_CHANNEL_CAPACITY: usize = 16;

/// Operations the control API and signal handlers hand to the reload
/// loop.
#[derive(Debug)]
pub enum ControlCommand {
    /// Re-read the top-level config file, then reload everything.
    Reconfig,
    /// Rescan the monitor, service and zone directories.
    Reload,
    /// Reload a single zone file by zone name.
    ReloadZone {
        zone: String,
        reply: oneshot::Sender<Result<(), String>>,
    },
}

pub struct Master {
    state: Arc<ServerState>,
    config_path: PathBuf,
    reload_lock: Mutex<()>,
    control_rx: mpsc::Receiver<ControlCommand>,
}

impl Master {
    /// Loads all registries, binds every DNS and control listener, and
    /// returns the running master. Any failure here is fatal to startup.
    pub async fn start(config_path: &Path, config: Config) -> Result<Master> {
        let state = ServerState::new(
            config.clone(),
            crate::service::ServicePlugins::standard(),
            crate::monitor::MonitorPlugins::standard(),
        );

        if let Some(snapshot) = state::load_state(&config.state_file) {
            info!(path = %config.state_file.display(), "loaded monitor state snapshot");
            state.monitoring.seed_states(snapshot);
        }

        info!("start to load monitoring config");
        state
            .monitoring
            .load_monitors(&config.monitors_dir)
            .await
            .context("initial monitor load failed")?;

        info!("start to load service config");
        state
            .services
            .load_services(&config.services_dir, &state.monitoring)
            .await
            .context("initial service load failed")?;

        info!("start to load zone data");
        state
            .zones
            .load_zones(&config.zones_dir, &state.services)
            .context("initial zone load failed")?;

        // Bind everything up front so a bad address fails startup instead
        // of dying quietly in a task.
        for listen in &config.listens {
            let udp = UdpSocket::bind(listen)
                .await
                .with_context(|| format!("cannot bind udp {listen}"))?;
            let tcp = TcpListener::bind(listen)
                .await
                .with_context(|| format!("cannot bind tcp {listen}"))?;
            info!(addr = %listen, "dns worker listening");
            tokio::spawn(Worker::new(Arc::clone(&state)).run_udp(udp));
            tokio::spawn(Worker::new(Arc::clone(&state)).run_tcp(tcp));
        }

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        for listen in &config.ctl_listens {
            let listener = TcpListener::bind(listen)
                .await
                .with_context(|| format!("cannot bind control api {listen}"))?;
            info!(addr = %listen, "control api listening");
            tokio::spawn(control::serve(
                listener,
                Arc::clone(&state),
                control_tx.clone(),
            ));
        }

        Ok(Master {
            state,
            config_path: config_path.to_path_buf(),
            reload_lock: Mutex::new(()),
            control_rx,
        })
    }

    /// The shared state, for tests and embedding.
    #[must_use]
    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Runs the reload loop until SIGTERM, then snapshots monitor state.
    pub async fn run(mut self) -> Result<()> {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("cannot install SIGTERM handler")?;
        let mut sighup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
            .context("cannot install SIGHUP handler")?;
        let mut ticker = tokio::time::interval(RELOAD_TICK);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("SIGTERM received, shutting down");
                    self.save_snapshot();
                    return Ok(());
                }
                _ = sighup.recv() => {
                    info!("SIGHUP received, reconfiguring");
                    self.reconfig().await;
                }
                command = self.control_rx.recv() => {
                    match command {
                        Some(ControlCommand::Reconfig) => self.reconfig().await,
                        Some(ControlCommand::Reload) => self.reload_all(false).await,
                        Some(ControlCommand::ReloadZone { zone, reply }) => {
                            let result = self.reload_zone(&zone).await;
                            let _ = reply.send(result.map_err(|e| format!("{e:#}")));
                        }
                        None => return Ok(()),
                    }
                }
                _ = ticker.tick() => {
                    self.reload_all(true).await;
                }
            }
        }
    }

    /// Re-reads the config file; on success the new config replaces the
    /// old and a full reload follows. A bad file leaves everything as it
    /// was.
    async fn reconfig(&self) {
        match load_config(&self.config_path) {
            Ok(config) => {
                self.state.set_config(config);
                self.reload_all(false).await;
            }
            Err(e) => {
                warn!(file = %self.config_path.display(), error = %e, "reconfig failed, keeping previous configuration");
            }
        }
    }

    /// One reload pass over all three registries. With `periodic` each
    /// step honours its auto-reload flag. Load failures abort their step
    /// with a warning; previously loaded state keeps serving.
    async fn reload_all(&self, periodic: bool) {
        let _guard = self.reload_lock.lock().await;
        let config = self.state.config();

        if !periodic || config.auto_monitor_reconfig {
            if let Err(e) = self.state.monitoring.load_monitors(&config.monitors_dir).await {
                warn!(error = %e, "monitor reload aborted");
            }
        }
        if !periodic || config.auto_service_reconfig {
            if let Err(e) = self
                .state
                .services
                .load_services(&config.services_dir, &self.state.monitoring)
                .await
            {
                warn!(error = %e, "service reload aborted");
            }
        }
        if !periodic || config.auto_zone_reload {
            if let Err(e) = self.state.zones.load_zones(&config.zones_dir, &self.state.services) {
                warn!(error = %e, "zone reload aborted");
            }
            self.state.zones.delete_zones(&self.state.services);
        }
        if !periodic || config.auto_service_reconfig {
            self.state.services.delete_services(&self.state.monitoring);
        }
        if !periodic || config.auto_monitor_reconfig {
            self.state.monitoring.delete_monitors();
        }

        self.save_snapshot();
    }

    /// Reloads one zone by name.
    async fn reload_zone(&self, zone: &str) -> Result<()> {
        let _guard = self.reload_lock.lock().await;
        let config = self.state.config();
        let path = config.zones_dir.join(zone.trim_end_matches('.'));
        self.state.zones.read_zone(&path, &self.state.services)
    }

    fn save_snapshot(&self) {
        let config = self.state.config();
        let snapshot = self.state.monitoring.snapshot();
        if let Err(e) = state::save_state(&config.state_file, &snapshot) {
            error!(path = %config.state_file.display(), error = %e, "cannot save monitor state snapshot");
        }
    }
}
