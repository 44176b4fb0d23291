//! Health Repository Port
//!
//! Defines the interface to the relational store that backs the health log
//! and the API metrics log.

use crate::domain::entities::{
    ApiMetricRecord, ApiMetricRollup, HealthCheckRecord, NewApiMetric, PoolSnapshot,
};
use crate::domain::value_objects::HealthState;
use crate::error::DatabaseError;
use async_trait::async_trait;
use std::time::Duration;

/// Repository for health checks and per-request API metrics.
///
/// This is an outbound port. The application services call it without
/// knowing which database or pool sits behind it. Every call is attempted
/// once; failures are returned, never retried.
#[async_trait]
pub trait HealthRepository: Send + Sync {
    /// Create both tables if they are absent. Idempotent.
    async fn initialize(&self) -> Result<(), DatabaseError>;

    /// Lightweight liveness round-trip.
    async fn ping(&self) -> Result<(), DatabaseError>;

    /// Connection occupancy, read while holding a connection for a round-trip.
    async fn connection_stats(&self) -> Result<PoolSnapshot, DatabaseError>;

    /// Occupancy without touching the database.
    fn pool_snapshot(&self) -> PoolSnapshot;

    /// Append a health check and return the stored row.
    async fn insert_health_check(
        &self,
        status: HealthState,
        details: &serde_json::Value,
    ) -> Result<HealthCheckRecord, DatabaseError>;

    /// Most recent health checks, newest first.
    async fn recent_health_checks(
        &self,
        limit: usize,
    ) -> Result<Vec<HealthCheckRecord>, DatabaseError>;

    /// Append a per-request metric and return the stored row.
    async fn insert_api_metric(
        &self,
        metric: NewApiMetric,
    ) -> Result<ApiMetricRecord, DatabaseError>;

    /// Rollup of API metrics newer than `window`, grouped by endpoint and method,
    /// busiest first.
    async fn api_metric_rollup(
        &self,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<ApiMetricRollup>, DatabaseError>;

    /// Release every connection. Waits for checked-out connections.
    async fn close(&self);
}
