// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Control-plane HTTP API.
//!
//! A small JSON surface per control listener:
//!
//! - `POST /v1/reconfig` — re-read the top-level config, then reload
//! - `POST /v1/reload` — rescan the monitor/service/zone directories
//! - `POST /v1/zones/{zonename}/reload` — reload one zone file
//! - `GET /v1/zones` | `/v1/services` | `/v1/monitors` — name lists
//!
//! Mutating operations are forwarded to the master's reload loop over the
//! control channel, so they serialise with every other reload trigger.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::server::master::ControlCommand;
use crate::server::ServerState;

#[derive(Clone)]
struct ControlState {
    state: Arc<ServerState>,
    control_tx: mpsc::Sender<ControlCommand>,
}

#[derive(Serialize)]
struct StatusBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct ZonesBody {
    zones: Vec<String>,
}

#[derive(Serialize)]
struct ServicesBody {
    services: Vec<String>,
}

#[derive(Serialize)]
struct MonitorsBody {
    monitors: Vec<String>,
}

/// Serves the control API on one bound listener.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    control_tx: mpsc::Sender<ControlCommand>,
) {
    let router = router(ControlState { state, control_tx });
    if let Err(e) = axum::serve(listener, router).await {
        error!(error = %e, "control api server error");
    }
}

fn router(control: ControlState) -> Router {
    Router::new()
        .route("/v1/reconfig", post(reconfig))
        .route("/v1/reload", post(reload))
        .route("/v1/zones/{zonename}/reload", post(reload_zone))
        .route("/v1/zones", get(get_zones))
        .route("/v1/services", get(get_services))
        .route("/v1/monitors", get(get_monitors))
        .with_state(control)
}

async fn reconfig(
    State(control): State<ControlState>,
) -> Result<Json<StatusBody>, StatusCode> {
    info!("receive request to reconfig");
    control
        .control_tx
        .send(ControlCommand::Reconfig)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(StatusBody { status: "ok" }))
}

async fn reload(State(control): State<ControlState>) -> Result<Json<StatusBody>, StatusCode> {
    info!("receive request to reload all zones");
    control
        .control_tx
        .send(ControlCommand::Reload)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(StatusBody { status: "ok" }))
}

async fn reload_zone(
    State(control): State<ControlState>,
    Path(zonename): Path<String>,
) -> Result<Json<StatusBody>, (StatusCode, Json<ErrorBody>)> {
    info!(zone = %zonename, "receive request to reload a zone");
    let (reply_tx, reply_rx) = oneshot::channel();
    let send_failed = |reason: String| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody { error: reason }),
        )
    };
    control
        .control_tx
        .send(ControlCommand::ReloadZone {
            zone: zonename,
            reply: reply_tx,
        })
        .await
        .map_err(|e| send_failed(e.to_string()))?;
    match reply_rx.await {
        Ok(Ok(())) => Ok(Json(StatusBody { status: "ok" })),
        Ok(Err(reason)) => Err((StatusCode::BAD_REQUEST, Json(ErrorBody { error: reason }))),
        Err(e) => Err(send_failed(e.to_string())),
    }
}

async fn get_zones(State(control): State<ControlState>) -> Json<ZonesBody> {
    info!("receive request to get zones");
    Json(ZonesBody {
        zones: control.state.zones.zone_names(),
    })
}

async fn get_services(State(control): State<ControlState>) -> Json<ServicesBody> {
    info!("receive request to get services");
    Json(ServicesBody {
        services: control.state.services.service_names(),
    })
}

async fn get_monitors(State(control): State<ControlState>) -> Json<MonitorsBody> {
    info!("receive request to get monitors");
    Json(MonitorsBody {
        monitors: control.state.monitoring.monitor_names(),
    })
}
