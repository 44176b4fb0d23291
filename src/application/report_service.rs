//! Report Service
//!
//! Read-side aggregations over the health log and the API metrics log, plus
//! the per-request API metric write.

use super::query_tracker::track_query;
use crate::domain::entities::{ApiMetricRecord, ApiMetricRollup, HealthCheckRecord, NewApiMetric};
use crate::domain::ports::{HealthRepository, MetricsStore};
use crate::error::DatabaseError;
use std::sync::Arc;
use std::time::Duration;

/// Rollup window for `GET /api/metrics`.
pub const ROLLUP_WINDOW: Duration = Duration::from_secs(3600);
/// Busiest endpoint groups returned by the rollup.
pub const ROLLUP_LIMIT: usize = 10;
/// Health checks returned by the history endpoint.
pub const HISTORY_LIMIT: usize = 100;

pub struct ReportService {
    repo: Arc<dyn HealthRepository>,
    metrics: Arc<dyn MetricsStore>,
}

impl ReportService {
    pub fn new(repo: Arc<dyn HealthRepository>, metrics: Arc<dyn MetricsStore>) -> Self {
        Self { repo, metrics }
    }

    /// Endpoint groups from the last hour, busiest first.
    pub async fn hourly_rollup(&self) -> Result<Vec<ApiMetricRollup>, DatabaseError> {
        track_query(
            self.metrics.as_ref(),
            "api_metrics_rollup",
            self.repo.api_metric_rollup(ROLLUP_WINDOW, ROLLUP_LIMIT),
        )
        .await
    }

    /// Newest health checks first.
    pub async fn health_history(&self) -> Result<Vec<HealthCheckRecord>, DatabaseError> {
        track_query(
            self.metrics.as_ref(),
            "health_history",
            self.repo.recent_health_checks(HISTORY_LIMIT),
        )
        .await
    }

    pub async fn record_api_metric(
        &self,
        metric: NewApiMetric,
    ) -> Result<ApiMetricRecord, DatabaseError> {
        track_query(
            self.metrics.as_ref(),
            "insert_api_metric",
            self.repo.insert_api_metric(metric),
        )
        .await
    }
}
