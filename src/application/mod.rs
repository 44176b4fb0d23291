//! Application Layer
//!
//! Use cases behind the HTTP endpoints. Services depend only on domain ports.

mod health_service;
mod query_tracker;
mod report_service;

#[cfg(test)]
pub(crate) mod mock_repo;

pub use health_service::{HealthCheckOutcome, HealthService, Readiness};
pub use query_tracker::track_query;
pub use report_service::{ReportService, HISTORY_LIMIT, ROLLUP_LIMIT, ROLLUP_WINDOW};
