//! Rotation endpoints.

use axum::{Json, extract::State};
use serde::Serialize;

use super::ApiError;
use crate::state::AppState;
use exitswap_common::{RotationPolicy, RotatorSnapshot};

#[derive(Serialize)]
pub struct RotateResponse {
    address: String,
    snapshot: RotatorSnapshot,
}

/// Rotate now. Optional body: `{"unique": bool, "prevent_baseline_match": bool}`.
/// A bare POST uses the default policy.
pub async fn rotate(
    State(state): State<AppState>,
    body: Option<Json<RotationPolicy>>,
) -> Result<Json<RotateResponse>, ApiError> {
    let policy = body.map(|Json(policy)| policy).unwrap_or_default();
    let (address, snapshot) = state.rotate(policy).await?;

    Ok(Json(RotateResponse { address, snapshot }))
}

/// Diagnostics from the most recent renewal
pub async fn diagnostics(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.diagnostics().await)
}
