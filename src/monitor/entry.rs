// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Monitor entry: one probe loop per (monitor, service, endpoint).
//!
//! The hysteresis state machine is kept separate from the timing loop so
//! it can be exercised without a runtime. Each entry owns an abortable
//! task; the monitoring manager aborts the old task before inserting a
//! replacement, so at most one prober exists per binding at any time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::monitor::MonitorConfig;
use crate::rr::RecordType;

/// UP/OK/NG hysteresis thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Consecutive OK probes needed to leave DOWN.
    pub up: u16,
    /// OK probes that reset the counters while UP.
    pub ok: u16,
    /// Consecutive NG probes needed to leave UP.
    pub ng: u16,
}

/// The two-state hysteresis machine driven by probe results.
#[derive(Debug, Clone, Copy)]
pub struct StatusMachine {
    status: bool,
    ok_counter: u16,
    ng_counter: u16,
}

impl StatusMachine {
    #[must_use]
    pub fn new(initial: bool) -> Self {
        StatusMachine {
            status: initial,
            ok_counter: 0,
            ng_counter: 0,
        }
    }

    /// Current state: `true` is UP.
    #[must_use]
    pub fn status(&self) -> bool {
        self.status
    }

    /// Feeds one probe result (a timeout counts as `false`); returns the
    /// new state when this result causes a transition.
    pub fn observe(&mut self, thresholds: &Thresholds, result: bool) -> Option<bool> {
        if self.status {
            if result {
                self.ok_counter += 1;
                if self.ok_counter >= thresholds.ok {
                    self.ok_counter = 0;
                    self.ng_counter = 0;
                }
            } else {
                self.ok_counter = 0;
                self.ng_counter += 1;
                if self.ng_counter >= thresholds.ng {
                    self.ng_counter = 0;
                    self.status = false;
                    return Some(false);
                }
            }
        } else if result {
            self.ok_counter += 1;
            if self.ok_counter >= thresholds.up {
                self.ok_counter = 0;
                self.ng_counter = 0;
                self.status = true;
                return Some(true);
            }
        } else {
            self.ok_counter = 0;
        }
        None
    }
}

/// A running monitor entry.
pub struct Entry {
    /// Service the endpoint belongs to.
    pub service: String,
    /// Endpoint path inside its service file.
    pub path: String,
    /// Endpoint value probed.
    pub value: String,
    /// Endpoint RR type.
    pub rtype: RecordType,
    status: Arc<AtomicBool>,
    status_tx: mpsc::Sender<bool>,
    task: JoinHandle<()>,
}

impl Entry {
    /// Latest probe-loop state, for snapshots and re-registration seeding.
    #[must_use]
    pub fn status(&self) -> bool {
        self.status.load(Ordering::Relaxed)
    }

    /// Producer side of the endpoint's status channel, for re-spawning the
    /// entry under a replaced monitor config.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<bool> {
        self.status_tx.clone()
    }

    /// Aborts the probe loop. Dropping the entry afterwards releases its
    /// side of the status channel, which in turn ends the endpoint's watch
    /// task.
    pub fn stop(&self) {
        self.task.abort();
    }
}

/// Spawns the probe loop for one binding. The initial status is published
/// immediately so a snapshot-seeded DOWN takes effect before the first
/// probe completes.
#[must_use]
pub fn spawn(
    config: Arc<MonitorConfig>,
    service: String,
    path: String,
    value: String,
    rtype: RecordType,
    initial: bool,
    status_tx: mpsc::Sender<bool>,
) -> Entry {
    let status = Arc::new(AtomicBool::new(initial));
    let task = tokio::spawn(probe_loop(
        Arc::clone(&config),
        service.clone(),
        path.clone(),
        value.clone(),
        rtype,
        initial,
        Arc::clone(&status),
        status_tx.clone(),
    ));
    Entry {
        service,
        path,
        value,
        rtype,
        status,
        status_tx,
        task,
    }
}

#[allow(clippy::too_many_arguments)]
async fn probe_loop(
    config: Arc<MonitorConfig>,
    service: String,
    path: String,
    value: String,
    rtype: RecordType,
    initial: bool,
    status: Arc<AtomicBool>,
    status_tx: mpsc::Sender<bool>,
) {
    let _ = status_tx.send(initial).await;
    let mut machine = StatusMachine::new(initial);
    let mut ticker = tokio::time::interval(config.interval);
    // The first tick of a tokio interval completes immediately; consume it
    // so probing starts one interval after registration.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let result = match tokio::time::timeout(config.timeout, config.probe.run(&value, rtype))
            .await
        {
            Ok(result) => result,
            Err(_) => false,
        };
        debug!(
            monitor = %config.name,
            service = %service,
            endpoint = %path,
            result,
            "probe result"
        );
        if let Some(transition) = machine.observe(&config.thresholds, result) {
            status.store(transition, Ordering::Relaxed);
            info!(
                monitor = %config.name,
                service = %service,
                endpoint = %path,
                status = transition,
                "monitor status transition"
            );
            // The receiver disappears when the endpoint's service is being
            // replaced; keep probing so the snapshot stays current.
            let _ = status_tx.send(transition).await;
        }
    }
}
