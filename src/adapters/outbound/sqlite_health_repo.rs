//! SQLite Health Repository
//!
//! Implements HealthRepository on a pooled SQLite database. Owns schema
//! bootstrap for the health log and the API metrics log.

use crate::domain::entities::{
    ApiMetricRecord, ApiMetricRollup, HealthCheckRecord, NewApiMetric, PoolSnapshot,
};
use crate::domain::ports::HealthRepository;
use crate::domain::value_objects::HealthState;
use crate::error::DatabaseError;
use crate::infrastructure::DbPool;
use async_trait::async_trait;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Row};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS health_checks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    status TEXT NOT NULL CHECK (status IN ('healthy', 'unhealthy')),
    details TEXT
);
CREATE INDEX IF NOT EXISTS idx_health_checks_timestamp ON health_checks (timestamp);

CREATE TABLE IF NOT EXISTS api_metrics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint TEXT NOT NULL,
    method TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    response_time INTEGER NOT NULL,
    timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
CREATE INDEX IF NOT EXISTS idx_api_metrics_timestamp ON api_metrics (timestamp);
";

/// SQLite-backed health repository.
pub struct SqliteHealthRepository {
    pool: DbPool,
    /// Logical database name, used in log lines
    database: String,
}

impl SqliteHealthRepository {
    pub fn new(pool: DbPool, database: impl Into<String>) -> Self {
        Self {
            pool,
            database: database.into(),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Execute a parameterized statement and return every row as column values.
    pub async fn query(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<Vec<Value>>, DatabaseError> {
        let sql = sql.to_string();
        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let columns = stmt.column_count();
                let rows = stmt
                    .query_map(params_from_iter(params.iter()), |row| {
                        (0..columns)
                            .map(|i| row.get::<_, Value>(i))
                            .collect::<rusqlite::Result<Vec<_>>>()
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Execute a parameterized statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<usize, DatabaseError> {
        let sql = sql.to_string();
        self.pool
            .run(move |conn| conn.execute(&sql, params_from_iter(params.iter())))
            .await
    }

    /// Convert a SQLite row to a HealthCheckRecord.
    fn row_to_health_check(row: &Row) -> rusqlite::Result<HealthCheckRecord> {
        let status: String = row.get(2)?;
        let status = HealthState::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                Type::Text,
                format!("unknown health status {:?}", status).into(),
            )
        })?;

        let details = match row.get::<_, Option<String>>(3)? {
            Some(text) => serde_json::from_str(&text).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
            })?,
            None => serde_json::Value::Null,
        };

        Ok(HealthCheckRecord {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            status,
            details,
        })
    }

    /// Convert a SQLite row to an ApiMetricRollup.
    fn row_to_rollup(row: &Row) -> rusqlite::Result<ApiMetricRollup> {
        Ok(ApiMetricRollup {
            endpoint: row.get(0)?,
            method: row.get(1)?,
            avg_response_time: row.get(2)?,
            request_count: row.get(3)?,
            error_count: row.get(4)?,
        })
    }
}

#[async_trait]
impl HealthRepository for SqliteHealthRepository {
    async fn initialize(&self) -> Result<(), DatabaseError> {
        self.pool.run(|conn| conn.execute_batch(SCHEMA)).await?;
        tracing::info!("database schema initialized ({})", self.database);
        Ok(())
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        self.pool
            .run(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await?;
        Ok(())
    }

    async fn connection_stats(&self) -> Result<PoolSnapshot, DatabaseError> {
        // Read occupancy while holding a connection so the probe counts itself.
        let pool = self.pool.clone();
        self.pool
            .run(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM pragma_database_list WHERE name = 'main'",
                    [],
                    |row| row.get::<_, i64>(0),
                )?;
                Ok(pool.snapshot())
            })
            .await
    }

    fn pool_snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }

    async fn insert_health_check(
        &self,
        status: HealthState,
        details: &serde_json::Value,
    ) -> Result<HealthCheckRecord, DatabaseError> {
        let details = details.clone();
        let text = details.to_string();
        let (id, timestamp) = self
            .pool
            .run(move |conn| {
                conn.query_row(
                    "INSERT INTO health_checks (status, details) VALUES (?1, ?2)
                     RETURNING id, timestamp",
                    params![status.as_str(), text],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                )
            })
            .await?;

        Ok(HealthCheckRecord {
            id,
            timestamp,
            status,
            details,
        })
    }

    async fn recent_health_checks(
        &self,
        limit: usize,
    ) -> Result<Vec<HealthCheckRecord>, DatabaseError> {
        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, timestamp, status, details
                     FROM health_checks
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?1",
                )?;
                let records = stmt
                    .query_map([limit as i64], |row| Self::row_to_health_check(row))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(records)
            })
            .await
    }

    async fn insert_api_metric(
        &self,
        metric: NewApiMetric,
    ) -> Result<ApiMetricRecord, DatabaseError> {
        self.pool
            .run(move |conn| {
                let (id, timestamp) = conn.query_row(
                    "INSERT INTO api_metrics (endpoint, method, status_code, response_time)
                     VALUES (?1, ?2, ?3, ?4)
                     RETURNING id, timestamp",
                    params![
                        metric.endpoint,
                        metric.method,
                        metric.status_code,
                        metric.response_time
                    ],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                )?;
                Ok(ApiMetricRecord {
                    id,
                    endpoint: metric.endpoint,
                    method: metric.method,
                    status_code: metric.status_code,
                    response_time: metric.response_time,
                    timestamp,
                })
            })
            .await
    }

    async fn api_metric_rollup(
        &self,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<ApiMetricRollup>, DatabaseError> {
        let modifier = format!("-{} seconds", window.as_secs());
        self.pool
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT endpoint,
                            method,
                            AVG(response_time) AS avg_response_time,
                            COUNT(*) AS request_count,
                            SUM(CASE WHEN status_code >= 400 THEN 1 ELSE 0 END) AS error_count
                     FROM api_metrics
                     WHERE timestamp > strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?1)
                     GROUP BY endpoint, method
                     ORDER BY request_count DESC, endpoint ASC, method ASC
                     LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![modifier, limit as i64], |row| Self::row_to_rollup(row))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
