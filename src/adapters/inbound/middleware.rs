//! HTTP Middleware
//!
//! Security headers, per-request metrics, and the panic response.

use super::http_server::AppState;
use crate::application::ReportService;
use crate::domain::entities::NewApiMetric;
use crate::domain::ports::MetricsStore;
use crate::error::ErrorBody;
use axum::body::Body;
use axum::extract::{MatchedPath, Request, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use http_body::{Frame, SizeHint};
use std::any::Any;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

/// Route label for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Status recorded when the client goes away before a response exists.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

const SECURITY_HEADERS: [(&str, &str); 8] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    (
        "strict-transport-security",
        "max-age=15552000; includeSubDomains",
    ),
    ("referrer-policy", "no-referrer"),
    ("x-dns-prefetch-control", "off"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("x-xss-protection", "0"),
];

/// Add hardening headers to every response.
pub async fn security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers
            .entry(HeaderName::from_static(name))
            .or_insert(HeaderValue::from_static(value));
    }
    response
}

/// Observes one request from entry until its response body is dropped.
struct RequestTracker {
    metrics: Arc<dyn MetricsStore>,
    reports: Option<Arc<ReportService>>,
    method: String,
    route: String,
    status: u16,
    started: Instant,
}

impl RequestTracker {
    fn start(
        metrics: Arc<dyn MetricsStore>,
        reports: Option<Arc<ReportService>>,
        method: String,
        route: String,
    ) -> Self {
        metrics.http_request_started(&method, &route);
        Self {
            metrics,
            reports,
            method,
            route,
            status: CLIENT_CLOSED_REQUEST,
            started: Instant::now(),
        }
    }
}

impl Drop for RequestTracker {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        self.metrics.record_http(
            &self.method,
            &self.route,
            self.status,
            elapsed.as_secs_f64(),
        );

        let Some(reports) = self.reports.take() else {
            return;
        };
        let metric = NewApiMetric {
            endpoint: std::mem::take(&mut self.route),
            method: std::mem::take(&mut self.method),
            status_code: self.status,
            response_time: elapsed.as_millis() as i64,
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = reports.record_api_metric(metric).await {
                        tracing::debug!("failed to persist api metric: {}", e);
                    }
                });
            }
            Err(_) => tracing::debug!("no runtime to persist api metric"),
        }
    }
}

/// Response body that finishes the request's metrics when dropped.
struct TrackedBody {
    inner: Body,
    _tracker: RequestTracker,
}

impl http_body::Body for TrackedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Record latency, count and in-flight gauge for every request, and queue
/// an `api_metrics` row once the response is done.
pub async fn track_http(
    State(state): State<AppState>,
    matched: Option<MatchedPath>,
    req: Request,
    next: Next,
) -> Response {
    let route = matched
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
    let reports = state
        .persist_api_metrics
        .then(|| state.reports.clone());

    let mut tracker = RequestTracker::start(
        state.metrics.clone(),
        reports,
        req.method().as_str().to_string(),
        route,
    );

    let response = next.run(req).await;
    tracker.status = response.status().as_u16();

    let (parts, body) = response.into_parts();
    Response::from_parts(
        parts,
        Body::new(TrackedBody {
            inner: body,
            _tracker: tracker,
        }),
    )
}

/// Build the 500 response for a caught handler panic.
///
/// The payload is only included when `expose` is set.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>, expose: bool) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!("handler panicked: {}", detail);

    let body = ErrorBody {
        error: "Internal Server Error".to_string(),
        stack: expose.then_some(detail),
    };
    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );
    response
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::outbound::PrometheusMetricsStore;
    use crate::application::mock_repo::MockHealthRepository;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_security_headers_added() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn(security_headers));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
        assert_eq!(headers["referrer-policy"], "no-referrer");
        assert!(headers.contains_key("strict-transport-security"));
    }

    #[tokio::test]
    async fn test_tracker_records_once_on_drop() {
        let metrics = Arc::new(PrometheusMetricsStore::new().unwrap());
        let mut tracker = RequestTracker::start(
            metrics.clone(),
            None,
            "GET".to_string(),
            "/api/test".to_string(),
        );
        assert_eq!(metrics.in_flight("GET", "/api/test"), 1);

        tracker.status = 200;
        drop(tracker);
        assert_eq!(metrics.in_flight("GET", "/api/test"), 0);
        assert_eq!(metrics.requests_total("GET", "/api/test", 200), 1);
    }

    #[tokio::test]
    async fn test_cancelled_request_is_recorded_as_client_closed() {
        let metrics = Arc::new(PrometheusMetricsStore::new().unwrap());
        let tracker = RequestTracker::start(
            metrics.clone(),
            None,
            "GET".to_string(),
            "/health".to_string(),
        );
        drop(tracker);

        assert_eq!(
            metrics.requests_total("GET", "/health", CLIENT_CLOSED_REQUEST),
            1
        );
        assert_eq!(metrics.in_flight("GET", "/health"), 0);
    }

    #[tokio::test]
    async fn test_tracker_persists_api_metric() {
        let metrics = Arc::new(PrometheusMetricsStore::new().unwrap());
        let repo = Arc::new(MockHealthRepository::default());
        let reports = Arc::new(ReportService::new(repo.clone(), metrics.clone()));

        let mut tracker = RequestTracker::start(
            metrics.clone(),
            Some(reports),
            "POST".to_string(),
            "/api/echo".to_string(),
        );
        tracker.status = 400;
        drop(tracker);

        for _ in 0..50 {
            if !repo.api_metrics.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let rows = repo.api_metrics.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].endpoint, "/api/echo");
        assert_eq!(rows[0].method, "POST");
        assert_eq!(rows[0].status_code, 400);
    }

    #[tokio::test]
    async fn test_tracked_body_passes_bytes_through() {
        let metrics = Arc::new(PrometheusMetricsStore::new().unwrap());
        let tracker = RequestTracker::start(
            metrics.clone(),
            None,
            "GET".to_string(),
            "/".to_string(),
        );
        let body = Body::new(TrackedBody {
            inner: Body::from("hello"),
            _tracker: tracker,
        });

        assert_eq!(metrics.in_flight("GET", "/"), 1);
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"hello");
        assert_eq!(metrics.in_flight("GET", "/"), 0);
    }

    #[tokio::test]
    async fn test_panic_response_exposes_payload_only_when_allowed() {
        let response = panic_response(Box::new("kaboom"), true);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Internal Server Error");
        assert_eq!(body["stack"], "kaboom");

        let response = panic_response(Box::new(String::from("kaboom")), false);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body.get("stack").is_none());
    }
}
