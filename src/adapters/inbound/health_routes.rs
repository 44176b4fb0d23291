//! Health probes mounted under `/health`.

use super::http_server::{not_found_handler, AppState};
use crate::application::{HealthCheckOutcome, Readiness};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_handler).fallback(not_found_handler))
        .route("/ready", get(ready_handler).fallback(not_found_handler))
        .route("/live", get(live_handler).fallback(not_found_handler))
}

/// Full health report. 503 when the database is unreachable.
async fn health_handler(State(state): State<AppState>) -> Response {
    match state.health.check().await {
        HealthCheckOutcome::Healthy(report) => (StatusCode::OK, Json(report)).into_response(),
        HealthCheckOutcome::Unhealthy(report) => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(report)).into_response()
        }
    }
}

async fn ready_handler(State(state): State<AppState>) -> Response {
    match state.health.readiness().await {
        Readiness::Ready => (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response(),
        Readiness::NotReady(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready", "error": error })),
        )
            .into_response(),
    }
}

/// Never touches the database.
async fn live_handler() -> impl IntoResponse {
    Json(json!({ "status": "alive" }))
}
