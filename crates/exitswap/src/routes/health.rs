//! Health and status endpoints.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::state::AppState;
use exitswap_common::RotatorSnapshot;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    snapshot: RotatorSnapshot,
    max_circuit_dirtiness: u64,
    uptime_secs: u64,
}

/// Current rotator state
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.snapshot().await;

    Json(StatusResponse {
        snapshot,
        max_circuit_dirtiness: state.max_circuit_dirtiness,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
