//! Metrics Store Port
//!
//! Defines the interface for recording and exporting runtime metrics.

use crate::domain::entities::PoolSnapshot;
use crate::domain::value_objects::QueryOutcome;

/// Store for HTTP and database metrics.
///
/// Implementations must tolerate concurrent updates from many in-flight
/// requests without losing increments.
pub trait MetricsStore: Send + Sync {
    /// A request has entered the handler stack.
    fn http_request_started(&self, method: &str, route: &str);

    /// A response has been fully sent (or dropped). Called exactly once per
    /// started request; also decrements the in-flight gauge.
    fn record_http(&self, method: &str, route: &str, status_code: u16, duration_secs: f64);

    /// Record the latency and outcome of one database query.
    fn record_db_query(&self, query_type: &str, outcome: QueryOutcome, duration_secs: f64);

    /// Publish current pool occupancy.
    fn set_pool_connections(&self, snapshot: &PoolSnapshot);

    /// Text exposition of every registered series. Read-only.
    fn export(&self) -> String;
}
