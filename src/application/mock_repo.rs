//! In-memory HealthRepository for service tests.

use crate::domain::entities::{
    ApiMetricRecord, ApiMetricRollup, HealthCheckRecord, NewApiMetric, PoolSnapshot,
};
use crate::domain::ports::HealthRepository;
use crate::domain::value_objects::HealthState;
use crate::error::{DatabaseError, PoolError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct MockHealthRepository {
    pub fail_ping: AtomicBool,
    pub fail_stats: AtomicBool,
    pub fail_insert: AtomicBool,
    pub health_checks: Mutex<Vec<HealthCheckRecord>>,
    pub api_metrics: Mutex<Vec<ApiMetricRecord>>,
}

impl MockHealthRepository {
    pub fn failing() -> Self {
        let repo = Self::default();
        repo.fail_ping.store(true, Ordering::SeqCst);
        repo.fail_stats.store(true, Ordering::SeqCst);
        repo
    }

    fn check(flag: &AtomicBool) -> Result<(), DatabaseError> {
        if flag.load(Ordering::SeqCst) {
            Err(PoolError::AcquireTimeout.into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HealthRepository for MockHealthRepository {
    async fn initialize(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Self::check(&self.fail_ping)
    }

    async fn connection_stats(&self) -> Result<PoolSnapshot, DatabaseError> {
        Self::check(&self.fail_stats)?;
        Ok(PoolSnapshot {
            total: 2,
            active: 1,
            idle: 1,
            waiting: 0,
        })
    }

    fn pool_snapshot(&self) -> PoolSnapshot {
        PoolSnapshot::default()
    }

    async fn insert_health_check(
        &self,
        status: HealthState,
        details: &serde_json::Value,
    ) -> Result<HealthCheckRecord, DatabaseError> {
        Self::check(&self.fail_insert)?;
        let mut rows = self.health_checks.lock().unwrap();
        let record = HealthCheckRecord {
            id: rows.len() as i64 + 1,
            timestamp: crate::domain::entities::iso_timestamp(),
            status,
            details: details.clone(),
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn recent_health_checks(
        &self,
        limit: usize,
    ) -> Result<Vec<HealthCheckRecord>, DatabaseError> {
        Self::check(&self.fail_ping)?;
        let rows = self.health_checks.lock().unwrap();
        Ok(rows.iter().rev().take(limit).cloned().collect())
    }

    async fn insert_api_metric(
        &self,
        metric: NewApiMetric,
    ) -> Result<ApiMetricRecord, DatabaseError> {
        Self::check(&self.fail_insert)?;
        let mut rows = self.api_metrics.lock().unwrap();
        let record = ApiMetricRecord {
            id: rows.len() as i64 + 1,
            endpoint: metric.endpoint,
            method: metric.method,
            status_code: metric.status_code,
            response_time: metric.response_time,
            timestamp: crate::domain::entities::iso_timestamp(),
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn api_metric_rollup(
        &self,
        _window: Duration,
        limit: usize,
    ) -> Result<Vec<ApiMetricRollup>, DatabaseError> {
        Self::check(&self.fail_ping)?;
        let rows = self.api_metrics.lock().unwrap();
        let mut groups: BTreeMap<(String, String), (i64, i64, i64)> = BTreeMap::new();
        for row in rows.iter() {
            let entry = groups
                .entry((row.endpoint.clone(), row.method.clone()))
                .or_default();
            entry.0 += row.response_time;
            entry.1 += 1;
            if row.status_code >= 400 {
                entry.2 += 1;
            }
        }
        let mut rollup: Vec<_> = groups
            .into_iter()
            .map(|((endpoint, method), (sum, count, errors))| ApiMetricRollup {
                endpoint,
                method,
                avg_response_time: sum as f64 / count as f64,
                request_count: count,
                error_count: errors,
            })
            .collect();
        rollup.sort_by(|a, b| b.request_count.cmp(&a.request_count));
        rollup.truncate(limit);
        Ok(rollup)
    }

    async fn close(&self) {}
}
