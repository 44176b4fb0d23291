//! Error types
//!
//! `DatabaseError` and `PoolError` come from the storage layer, `StartupError`
//! aborts the process, and `ApiError` is what HTTP handlers return.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Failure to hand out a pooled database connection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PoolError {
    /// No connection became available within the acquisition timeout
    #[error("timeout exceeded when trying to acquire a connection")]
    AcquireTimeout,
    /// The pool has been closed
    #[error("connection pool is closed")]
    Closed,
}

/// Connectivity or query failure. Displays as the underlying driver message.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("{0}")]
    Query(#[from] rusqlite::Error),
    #[error("{0}")]
    Pool(#[from] PoolError),
    #[error("database task failed: {0}")]
    Task(String),
}

/// Fatal error raised while bringing the service up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("schema initialization failed: {0}")]
    Schema(#[source] DatabaseError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CORS origin {0:?}")]
    CorsOrigin(String),
    #[error("metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Error body returned to HTTP clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// HTTP-facing error.
///
/// `detail` is only rendered when `expose` is set, which the router does
/// outside production.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub detail: Option<String>,
    pub expose: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
            expose: false,
        }
    }

    /// Map a database failure on a read endpoint to a 500.
    ///
    /// The driver message is only passed through when `expose` is true.
    pub fn from_database(err: &DatabaseError, expose: bool) -> Self {
        let message = if expose {
            err.to_string()
        } else {
            "Internal Server Error".to_string()
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
            detail: Some(format!("{:?}", err)),
            expose,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>, expose: bool) -> Self {
        self.detail = Some(detail.into());
        self.expose = expose;
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "request failed: {}", self.message);
        }
        let body = ErrorBody {
            error: self.message,
            stack: if self.expose { self.detail } else { None },
        };
        (self.status, Json(body)).into_response()
    }
}
