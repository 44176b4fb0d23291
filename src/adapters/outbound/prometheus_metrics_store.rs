//! Prometheus Metrics Store
//!
//! Implements MetricsStore on an explicitly constructed Prometheus registry.

use crate::domain::entities::PoolSnapshot;
use crate::domain::ports::MetricsStore;
use crate::domain::value_objects::{PoolState, QueryOutcome};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

const NAMESPACE: &str = "dx03_backend";

/// Latency buckets in seconds, shared by HTTP and database histograms.
pub const LATENCY_BUCKETS: [f64; 8] = [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// Prometheus-backed metrics store.
///
/// Owns its registry, so several stores can coexist in one process (tests
/// build one per router).
pub struct PrometheusMetricsStore {
    registry: Registry,
    http_request_duration: HistogramVec,
    http_requests_total: IntCounterVec,
    http_requests_in_progress: IntGaugeVec,
    db_pool_connections: IntGaugeVec,
    db_query_duration: HistogramVec,
    db_queries_total: IntCounterVec,
}

impl PrometheusMetricsStore {
    /// Create a store and register every series.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Duration of HTTP requests in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["method", "route", "status_code"],
        )?;
        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests").namespace(NAMESPACE),
            &["method", "route", "status_code"],
        )?;
        let http_requests_in_progress = IntGaugeVec::new(
            Opts::new(
                "http_requests_in_progress",
                "Number of HTTP requests currently being served",
            )
            .namespace(NAMESPACE),
            &["method", "route"],
        )?;
        let db_pool_connections = IntGaugeVec::new(
            Opts::new("db_pool_connections", "Database connection pool occupancy")
                .namespace(NAMESPACE),
            &["state"],
        )?;
        let db_query_duration = HistogramVec::new(
            HistogramOpts::new(
                "db_query_duration_seconds",
                "Duration of database queries in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["query_type"],
        )?;
        let db_queries_total = IntCounterVec::new(
            Opts::new("db_queries_total", "Total number of database queries").namespace(NAMESPACE),
            &["query_type", "status"],
        )?;

        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_requests_in_progress.clone()))?;
        registry.register(Box::new(db_pool_connections.clone()))?;
        registry.register(Box::new(db_query_duration.clone()))?;
        registry.register(Box::new(db_queries_total.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            http_request_duration,
            http_requests_total,
            http_requests_in_progress,
            db_pool_connections,
            db_query_duration,
            db_queries_total,
        })
    }

    /// Requests currently in flight for a route.
    pub fn in_flight(&self, method: &str, route: &str) -> i64 {
        self.http_requests_in_progress
            .with_label_values(&[method, route])
            .get()
    }

    /// Completed requests for a route and status.
    pub fn requests_total(&self, method: &str, route: &str, status_code: u16) -> u64 {
        self.http_requests_total
            .with_label_values(&[method, route, &status_code.to_string()])
            .get()
    }

    /// Recorded queries of one type and outcome.
    pub fn queries_total(&self, query_type: &str, outcome: QueryOutcome) -> u64 {
        self.db_queries_total
            .with_label_values(&[query_type, outcome.as_str()])
            .get()
    }

    /// Last published pool gauge for a state.
    pub fn pool_connections(&self, state: PoolState) -> i64 {
        self.db_pool_connections
            .with_label_values(&[state.as_str()])
            .get()
    }
}

impl MetricsStore for PrometheusMetricsStore {
    fn http_request_started(&self, method: &str, route: &str) {
        self.http_requests_in_progress
            .with_label_values(&[method, route])
            .inc();
    }

    fn record_http(&self, method: &str, route: &str, status_code: u16, duration_secs: f64) {
        let status = status_code.to_string();
        self.http_request_duration
            .with_label_values(&[method, route, &status])
            .observe(duration_secs);
        self.http_requests_total
            .with_label_values(&[method, route, &status])
            .inc();
        self.http_requests_in_progress
            .with_label_values(&[method, route])
            .dec();
    }

    fn record_db_query(&self, query_type: &str, outcome: QueryOutcome, duration_secs: f64) {
        self.db_query_duration
            .with_label_values(&[query_type])
            .observe(duration_secs);
        self.db_queries_total
            .with_label_values(&[query_type, outcome.as_str()])
            .inc();
    }

    fn set_pool_connections(&self, snapshot: &PoolSnapshot) {
        for state in PoolState::ALL {
            let value = match state {
                PoolState::Total => snapshot.total,
                PoolState::Active => snapshot.active,
                PoolState::Idle => snapshot.idle,
                PoolState::Waiting => snapshot.waiting,
            };
            self.db_pool_connections
                .with_label_values(&[state.as_str()])
                .set(value as i64);
        }
    }

    fn export(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
