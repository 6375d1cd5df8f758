//! Admin HTTP routes for exitswap.

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use exitswap_common::RotatorError;

mod health;
mod rotation;

/// Create the admin router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/status", get(health::status))

        // Rotation
        .route("/rotate", post(rotation::rotate))
        .route("/diagnostics", get(rotation::diagnostics))

        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    retryable: bool,
}

/// Rotator errors rendered as JSON with a matching status code
pub struct ApiError(RotatorError);

impl From<RotatorError> for ApiError {
    fn from(err: RotatorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };

        (status, Json(body)).into_response()
    }
}
