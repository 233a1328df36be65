// Control API: race commands, configuration and telemetry link management.

use crate::domain::terrain::BASELINE;
use crate::domain::{ConfigPatch, RacePhase, TrackConfig};
use crate::interface_adapters::http::ErrorResponse;
use crate::interface_adapters::protocol::{
    ClientCommand, ConfigUpdateDto, RaceSnapshotDto, TestCommandRequest,
};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::telemetry::{LinkStatus, TelemetryError};
use crate::use_cases::{RaceCommand, RaceStopped};

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;

/// Failures surfaced by control endpoints.
#[derive(Debug)]
pub enum ControlError {
    RaceStopped,
    Telemetry(TelemetryError),
}

impl From<RaceStopped> for ControlError {
    fn from(_: RaceStopped) -> Self {
        ControlError::RaceStopped
    }
}

impl From<TelemetryError> for ControlError {
    fn from(e: TelemetryError) -> Self {
        ControlError::Telemetry(e)
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ControlError::RaceStopped => (
                StatusCode::SERVICE_UNAVAILABLE,
                "race loop is not running".to_string(),
            ),
            ControlError::Telemetry(
                e @ (TelemetryError::NotConnected | TelemetryError::AlreadyConnected),
            ) => (StatusCode::CONFLICT, e.to_string()),
            ControlError::Telemetry(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct StatusResponse {
    link: LinkStatus,
    connected: bool,
    port: Option<String>,
    phase: RacePhase,
}

#[derive(Debug, serde::Serialize)]
pub struct TerrainResponse {
    baseline: f64,
    ramp_center: usize,
    ramp_half_width: usize,
    values: Vec<f64>,
}

#[derive(Debug, serde::Serialize)]
pub struct CommandAccepted {
    queued: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct ConfigResponse {
    config: TrackConfig,
    // True when the race is underway and the config waits for the next reset.
    deferred: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct LinkResponse {
    link: LinkStatus,
    port: Option<String>,
}

pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let link = state.telemetry.status();
    Json(StatusResponse {
        connected: link.is_connected(),
        link,
        port: state.telemetry.port().await,
        phase: state.race.snapshot().phase,
    })
}

pub async fn race_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(RaceSnapshotDto::from(state.race.snapshot()))
}

pub async fn terrain_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Geometry comes from the same map so values and ramp never disagree.
    let terrain = state.race.terrain();
    Json(TerrainResponse {
        baseline: BASELINE,
        ramp_center: terrain.ramp_center(),
        ramp_half_width: terrain.ramp_half_width(),
        values: terrain.values().to_vec(),
    })
}

pub async fn command_handler(
    State(state): State<Arc<AppState>>,
    Json(command): Json<ClientCommand>,
) -> Result<impl IntoResponse, ControlError> {
    state.race.send(command.into()).await?;
    Ok((StatusCode::ACCEPTED, Json(CommandAccepted { queued: true })))
}

pub async fn config_handler(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ConfigUpdateDto>,
) -> Result<impl IntoResponse, ControlError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    state
        .race
        .send(RaceCommand::ApplyConfig {
            patch: ConfigPatch::from(update),
            reply: Some(reply_tx),
        })
        .await?;
    let staged = reply_rx.await.map_err(|_| ControlError::RaceStopped)?;
    Ok(Json(ConfigResponse {
        config: staged.config,
        deferred: !staged.applied,
    }))
}

pub async fn connect_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ControlError> {
    let port = state.telemetry.connect().await?;
    info!(port = %port, "telemetry connected via api");
    Ok(Json(LinkResponse {
        link: state.telemetry.status(),
        port: Some(port),
    }))
}

pub async fn disconnect_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ControlError> {
    state.telemetry.disconnect().await?;
    Ok(Json(LinkResponse {
        link: state.telemetry.status(),
        port: None,
    }))
}

pub async fn test_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TestCommandRequest>,
) -> Result<impl IntoResponse, ControlError> {
    state.telemetry.send(request.command.to_message()).await?;
    Ok((StatusCode::ACCEPTED, Json(CommandAccepted { queued: true })))
}
