//! HTTP Server
//!
//! Router assembly, middleware stack, and the serve loop with bounded
//! graceful shutdown.

use super::middleware::{panic_response, security_headers, track_http};
use super::{api_routes, health_routes};
use crate::application::{HealthService, ReportService};
use crate::domain::ports::MetricsStore;
use crate::error::StartupError;
use crate::infrastructure::ShutdownController;
use axum::extract::{DefaultBodyLimit, OriginalUri, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, ServiceExt};
use serde::Serialize;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
pub const BODY_LIMIT_BYTES: usize = 100 * 1024;

/// Content type of the text exposition format.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared handles for every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthService>,
    pub reports: Arc<ReportService>,
    pub metrics: Arc<dyn MetricsStore>,
    pub environment: String,
    /// Include error detail in responses (outside production)
    pub expose_errors: bool,
    /// Write one `api_metrics` row per request
    pub persist_api_metrics: bool,
    /// Allowed CORS origin, `*` for any
    pub cors_origin: String,
}

#[derive(Debug, Serialize)]
struct Endpoints {
    health: &'static str,
    api: &'static str,
    metrics: &'static str,
}

#[derive(Debug, Serialize)]
struct ServiceDescriptor {
    name: &'static str,
    version: &'static str,
    status: &'static str,
    environment: String,
    endpoints: Endpoints,
}

#[derive(Debug, Serialize)]
struct NotFound {
    error: &'static str,
    message: String,
}

fn cors_layer(origin: &str) -> Result<CorsLayer, StartupError> {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        let value = HeaderValue::from_str(origin)
            .map_err(|_| StartupError::CorsOrigin(origin.to_string()))?;
        AllowOrigin::exact(value)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers(AllowHeaders::mirror_request()))
}

/// Router with trailing slashes trimmed before routing.
pub type App = NormalizePath<Router>;

/// Build the application router with its full middleware stack.
///
/// Each `layer` wraps everything added before it, so the stack reads
/// innermost first: security headers end up outermost.
pub fn build_router(state: AppState) -> Result<Router, StartupError> {
    let cors = cors_layer(&state.cors_origin)?;
    let expose = state.expose_errors;

    let router = Router::new()
        .route("/", get(root_handler).fallback(not_found_handler))
        .route("/metrics", get(metrics_handler).fallback(not_found_handler))
        .nest("/health", health_routes::router())
        .nest("/api", api_routes::router())
        .fallback(not_found_handler)
        .layer(CatchPanicLayer::custom(move |payload| {
            panic_response(payload, expose)
        }))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            track_http,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(axum::middleware::from_fn(security_headers))
        .with_state(state);

    Ok(router)
}

/// The router as served: `/health/` is routed as `/health`.
pub fn build_app(state: AppState) -> Result<App, StartupError> {
    Ok(NormalizePathLayer::trim_trailing_slash().layer(build_router(state)?))
}

async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(ServiceDescriptor {
        name: "dx03-backend",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        environment: state.environment.clone(),
        endpoints: Endpoints {
            health: "/health",
            api: "/api",
            metrics: "/metrics",
        },
    })
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        state.metrics.export(),
    )
        .into_response()
}

/// 404 for unknown paths, and for known paths requested with the wrong method.
pub(crate) async fn not_found_handler(
    method: Method,
    OriginalUri(uri): OriginalUri,
) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(NotFound {
            error: "Not Found",
            message: format!("Route {} {} not found", method, uri),
        }),
    )
        .into_response()
}

/// HTTP server bound to the configured address.
pub struct HttpServer {
    listen_addr: String,
    app: App,
}

impl HttpServer {
    pub fn new(listen_addr: String, state: AppState) -> Result<Self, StartupError> {
        Ok(Self {
            listen_addr,
            app: build_app(state)?,
        })
    }

    /// Bind, then serve until shutdown.
    ///
    /// In-flight requests get the shutdown grace period to drain; after that
    /// the server returns anyway.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(self, shutdown: ShutdownController) -> Result<(), StartupError> {
        let listener = TcpListener::bind(&self.listen_addr)
            .await
            .map_err(|source| StartupError::Bind {
                addr: self.listen_addr.clone(),
                source,
            })?;
        tracing::info!("HTTP server listening on {}", self.listen_addr);

        let signal = shutdown.clone();
        let server = axum::serve(
            listener,
            ServiceExt::<Request>::into_make_service(self.app),
        )
            .with_graceful_shutdown(async move { signal.wait().await })
            .into_future();

        let grace = shutdown.grace();
        tokio::select! {
            result = server => {
                if let Err(e) = result {
                    tracing::error!("HTTP server error: {}", e);
                }
            }
            _ = async {
                shutdown.wait().await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!("in-flight requests did not drain within {:?}, exiting", grace);
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
