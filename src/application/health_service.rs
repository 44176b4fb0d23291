//! Health Service
//!
//! Computes the health report: database round-trip, pool occupancy, process
//! stats. A healthy report is persisted before it is returned.

use super::query_tracker::track_query;
use crate::domain::entities::{
    format_millis, iso_timestamp, DatabaseHealth, HealthReport, MemoryUsage, UnhealthyReport,
};
use crate::domain::ports::{HealthRepository, MetricsStore};
use crate::domain::value_objects::HealthState;
use crate::infrastructure::collect_process_stats;
use std::sync::Arc;
use std::time::Instant;

/// Result of one health computation.
#[derive(Debug, Clone)]
pub enum HealthCheckOutcome {
    Healthy(HealthReport),
    Unhealthy(UnhealthyReport),
}

impl HealthCheckOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy(_))
    }
}

/// Result of the readiness probe.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Ready,
    NotReady(String),
}

pub struct HealthService {
    repo: Arc<dyn HealthRepository>,
    metrics: Arc<dyn MetricsStore>,
    environment: String,
    /// Uptime origin
    started_at: Instant,
}

impl HealthService {
    pub fn new(
        repo: Arc<dyn HealthRepository>,
        metrics: Arc<dyn MetricsStore>,
        environment: impl Into<String>,
        started_at: Instant,
    ) -> Self {
        Self {
            repo,
            metrics,
            environment: environment.into(),
            started_at,
        }
    }

    /// Run one full health check.
    ///
    /// Nothing is persisted unless both database queries succeed. A failed
    /// insert also yields an unhealthy outcome.
    pub async fn check(&self) -> HealthCheckOutcome {
        let start = Instant::now();
        let metrics = self.metrics.as_ref();

        let ping_start = Instant::now();
        if let Err(e) = track_query(metrics, "health_check", self.repo.ping()).await {
            return self.unhealthy(e);
        }
        let latency = ping_start.elapsed().as_millis();

        let connections =
            match track_query(metrics, "connection_stats", self.repo.connection_stats()).await {
                Ok(snapshot) => snapshot,
                Err(e) => return self.unhealthy(e),
            };
        self.metrics.set_pool_connections(&connections);

        let process = collect_process_stats(self.started_at);

        let report = HealthReport {
            status: HealthState::Healthy,
            timestamp: iso_timestamp(),
            uptime: process.uptime_secs,
            environment: self.environment.clone(),
            database: DatabaseHealth {
                status: "connected".to_string(),
                latency: format_millis(latency),
                connections,
            },
            memory: MemoryUsage {
                used: format!("{}MB", process.memory_used_mb),
                total: format!("{}MB", process.memory_total_mb),
            },
            response_time: format_millis(start.elapsed().as_millis()),
        };

        let details = match serde_json::to_value(&report) {
            Ok(details) => details,
            Err(e) => return self.unhealthy(e),
        };

        if let Err(e) = track_query(
            metrics,
            "insert_health_check",
            self.repo.insert_health_check(HealthState::Healthy, &details),
        )
        .await
        {
            return self.unhealthy(e);
        }

        HealthCheckOutcome::Healthy(report)
    }

    /// One trivial query against the database.
    pub async fn readiness(&self) -> Readiness {
        match track_query(self.metrics.as_ref(), "readiness", self.repo.ping()).await {
            Ok(()) => Readiness::Ready,
            Err(e) => {
                tracing::warn!("readiness check failed: {}", e);
                Readiness::NotReady(e.to_string())
            }
        }
    }

    fn unhealthy(&self, err: impl std::fmt::Display) -> HealthCheckOutcome {
        tracing::warn!("health check failed: {}", err);
        self.metrics.set_pool_connections(&self.repo.pool_snapshot());
        HealthCheckOutcome::Unhealthy(UnhealthyReport::new(iso_timestamp(), err.to_string()))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::outbound::PrometheusMetricsStore;
    use crate::application::mock_repo::MockHealthRepository;
    use crate::domain::value_objects::{PoolState, QueryOutcome};
    use std::sync::atomic::Ordering;
    use tracing_test::traced_test;

    fn service(
        repo: Arc<MockHealthRepository>,
    ) -> (HealthService, Arc<PrometheusMetricsStore>) {
        let metrics = Arc::new(PrometheusMetricsStore::new().unwrap());
        let svc = HealthService::new(repo, metrics.clone(), "test", Instant::now());
        (svc, metrics)
    }

    #[tokio::test]
    async fn test_healthy_check_persists_report() {
        let repo = Arc::new(MockHealthRepository::default());
        let (svc, metrics) = service(repo.clone());

        let report = match svc.check().await {
            HealthCheckOutcome::Healthy(report) => report,
            other => panic!("expected healthy, got {:?}", other),
        };

        assert_eq!(report.status, HealthState::Healthy);
        assert_eq!(report.environment, "test");
        assert_eq!(report.database.status, "connected");
        assert!(report.database.latency.ends_with("ms"));
        assert!(report.response_time.ends_with("ms"));
        assert!(report.memory.used.ends_with("MB"));
        assert_eq!(report.database.connections.total, 2);

        let rows = repo.health_checks.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, HealthState::Healthy);
        assert_eq!(rows[0].details, serde_json::to_value(&report).unwrap());

        assert_eq!(metrics.pool_connections(PoolState::Active), 1);
        assert_eq!(metrics.queries_total("health_check", QueryOutcome::Success), 1);
        assert_eq!(metrics.queries_total("connection_stats", QueryOutcome::Success), 1);
        assert_eq!(
            metrics.queries_total("insert_health_check", QueryOutcome::Success),
            1
        );
    }

    #[tokio::test]
    async fn test_latency_strings_are_non_negative_integers() {
        let repo = Arc::new(MockHealthRepository::default());
        let (svc, _) = service(repo);

        if let HealthCheckOutcome::Healthy(report) = svc.check().await {
            let latency = report.database.latency.trim_end_matches("ms");
            assert!(latency.parse::<u64>().is_ok());
            let total = report.response_time.trim_end_matches("ms");
            assert!(total.parse::<u64>().unwrap() >= latency.parse::<u64>().unwrap());
        } else {
            panic!("expected healthy outcome");
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_ping_failure_persists_nothing() {
        let repo = Arc::new(MockHealthRepository::failing());
        let (svc, metrics) = service(repo.clone());

        match svc.check().await {
            HealthCheckOutcome::Unhealthy(report) => {
                assert_eq!(report.status, HealthState::Unhealthy);
                assert_eq!(report.database.status, "disconnected");
                assert_eq!(
                    report.error,
                    "timeout exceeded when trying to acquire a connection"
                );
            }
            other => panic!("expected unhealthy, got {:?}", other),
        }

        assert!(repo.health_checks.lock().unwrap().is_empty());
        assert_eq!(metrics.queries_total("health_check", QueryOutcome::Error), 1);
        assert_eq!(metrics.queries_total("connection_stats", QueryOutcome::Success), 0);
        assert!(logs_contain("health check failed"));
    }

    #[tokio::test]
    async fn test_stats_failure_persists_nothing() {
        let repo = Arc::new(MockHealthRepository::default());
        repo.fail_stats.store(true, Ordering::SeqCst);
        let (svc, metrics) = service(repo.clone());

        assert!(!svc.check().await.is_healthy());
        assert!(repo.health_checks.lock().unwrap().is_empty());
        assert_eq!(metrics.queries_total("connection_stats", QueryOutcome::Error), 1);
    }

    #[tokio::test]
    async fn test_insert_failure_is_unhealthy() {
        let repo = Arc::new(MockHealthRepository::default());
        repo.fail_insert.store(true, Ordering::SeqCst);
        let (svc, metrics) = service(repo.clone());

        assert!(!svc.check().await.is_healthy());
        assert_eq!(
            metrics.queries_total("insert_health_check", QueryOutcome::Error),
            1
        );
    }

    #[tokio::test]
    async fn test_each_healthy_check_appends_one_row() {
        let repo = Arc::new(MockHealthRepository::default());
        let (svc, _) = service(repo.clone());

        for _ in 0..3 {
            assert!(svc.check().await.is_healthy());
        }
        assert_eq!(repo.health_checks.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_readiness() {
        let repo = Arc::new(MockHealthRepository::default());
        let (svc, _) = service(repo.clone());
        assert_eq!(svc.readiness().await, Readiness::Ready);

        repo.fail_ping.store(true, Ordering::SeqCst);
        assert_eq!(
            svc.readiness().await,
            Readiness::NotReady("timeout exceeded when trying to acquire a connection".to_string())
        );
    }
}
