//! Domain Entities - Core business objects
//!
//! Records persisted by the health log and the API metrics log, plus the
//! report shapes returned by the health endpoint.

use crate::domain::value_objects::HealthState;
use serde::{Deserialize, Serialize};

/// A persisted health check. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckRecord {
    /// Monotonic row id
    pub id: i64,
    /// ISO-8601 UTC timestamp assigned by the database
    pub timestamp: String,
    pub status: HealthState,
    /// The report that was returned to the caller
    pub details: serde_json::Value,
}

/// A persisted per-request API metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMetricRecord {
    pub id: i64,
    /// Matched route template, e.g. `/api/echo`
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    /// Response time in milliseconds
    pub response_time: i64,
    pub timestamp: String,
}

/// Fields supplied when writing an API metric; id and timestamp come from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApiMetric {
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    pub response_time: i64,
}

/// One row of the hourly rollup over `api_metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMetricRollup {
    pub endpoint: String,
    pub method: String,
    pub avg_response_time: f64,
    pub request_count: i64,
    pub error_count: i64,
}

/// Live connection pool occupancy. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Open connections (active + idle)
    pub total: usize,
    /// Connections checked out
    pub active: usize,
    /// Open connections waiting in the pool
    pub idle: usize,
    /// Callers suspended waiting for a connection
    pub waiting: usize,
}

/// Database section of a healthy report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseHealth {
    /// Always `connected` for a healthy report
    pub status: String,
    /// Liveness query latency, e.g. `3ms`
    pub latency: String,
    pub connections: PoolSnapshot,
}

/// Process memory in whole megabytes, e.g. `42MB`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub used: String,
    pub total: String,
}

/// Body of a successful `GET /health`. Also stored as `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub timestamp: String,
    /// Process uptime in seconds
    pub uptime: f64,
    pub environment: String,
    pub database: DatabaseHealth,
    pub memory: MemoryUsage,
    #[serde(rename = "responseTime")]
    pub response_time: String,
}

/// Database section of a degraded report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDisconnected {
    pub status: String,
}

/// Body of a failed `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnhealthyReport {
    pub status: HealthState,
    pub timestamp: String,
    pub error: String,
    pub database: DatabaseDisconnected,
}

impl UnhealthyReport {
    pub fn new(timestamp: String, error: impl Into<String>) -> Self {
        Self {
            status: HealthState::Unhealthy,
            timestamp,
            error: error.into(),
            database: DatabaseDisconnected {
                status: "disconnected".to_string(),
            },
        }
    }
}

/// Current UTC time in the ISO-8601 form used across the API.
pub fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Format a millisecond duration the way reports carry it.
pub fn format_millis(ms: u128) -> String {
    format!("{}ms", ms)
}
