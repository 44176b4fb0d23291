//! JSON API mounted under `/api`.

use super::http_server::{not_found_handler, AppState};
use crate::domain::entities::{iso_timestamp, ApiMetricRollup, HealthCheckRecord};
use crate::error::ApiError;
use axum::extract::{FromRequest, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/metrics", get(metrics_handler).fallback(not_found_handler))
        .route(
            "/health-history",
            get(history_handler).fallback(not_found_handler),
        )
        .route("/test", get(test_handler).fallback(not_found_handler))
        .route("/echo", post(echo_handler).fallback(not_found_handler))
}

#[derive(Debug, Serialize)]
struct RollupResponse {
    metrics: Vec<ApiMetricRollup>,
    period: &'static str,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    history: Vec<HealthCheckRecord>,
}

#[derive(Debug, Serialize)]
struct TestResponse {
    message: &'static str,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct EchoResponse {
    received: Value,
    timestamp: String,
}

async fn metrics_handler(State(state): State<AppState>) -> Result<Json<RollupResponse>, ApiError> {
    let metrics = state
        .reports
        .hourly_rollup()
        .await
        .map_err(|e| ApiError::from_database(&e, state.expose_errors))?;

    Ok(Json(RollupResponse {
        metrics,
        period: "1 hour",
    }))
}

async fn history_handler(
    State(state): State<AppState>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state
        .reports
        .health_history()
        .await
        .map_err(|e| ApiError::from_database(&e, state.expose_errors))?;

    Ok(Json(HistoryResponse { history }))
}

async fn test_handler() -> Json<TestResponse> {
    Json(TestResponse {
        message: "API is working!",
        timestamp: iso_timestamp(),
    })
}

/// Essence of the request's content type, lowercased.
fn mime_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().to_ascii_lowercase())
}

/// Whether the request declares a JSON body (`application/json` or `+json`).
fn is_json_content(headers: &HeaderMap) -> bool {
    mime_of(headers)
        .map(|mime| mime == "application/json" || mime.ends_with("+json"))
        .unwrap_or(false)
}

fn is_form_content(headers: &HeaderMap) -> bool {
    mime_of(headers).as_deref() == Some("application/x-www-form-urlencoded")
}

/// Map a body extraction failure (oversized or unreadable) to a JSON error.
fn body_rejected(status: StatusCode, text: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(status, "request entity too large")
    } else {
        ApiError::new(status, text)
    }
}

/// Echo the parsed body back.
///
/// JSON bodies are parsed as JSON and form bodies as a flat object of string
/// fields. Anything else, and empty JSON bodies, are received as `{}`.
/// Malformed JSON is a 400.
async fn echo_handler(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<EchoResponse>, ApiError> {
    let received = if is_form_content(req.headers()) {
        let Form(fields) = Form::<Map<String, Value>>::from_request(req, &state)
            .await
            .map_err(|e| body_rejected(e.status(), e.body_text()))?;
        Value::Object(fields)
    } else {
        let json = is_json_content(req.headers());
        let body = Bytes::from_request(req, &state)
            .await
            .map_err(|e| body_rejected(e.status(), e.body_text()))?;
        if !json || body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Map::new())
        } else {
            serde_json::from_slice(&body).map_err(|e| {
                ApiError::new(StatusCode::BAD_REQUEST, "Malformed JSON in request body")
                    .with_detail(e.to_string(), state.expose_errors)
            })?
        }
    };

    Ok(Json(EchoResponse {
        received,
        timestamp: iso_timestamp(),
    }))
}
