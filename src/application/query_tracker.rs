//! Query instrumentation
//!
//! Latency and outcome recording around every repository call.

use crate::domain::ports::MetricsStore;
use crate::domain::value_objects::QueryOutcome;
use std::future::Future;
use std::time::Instant;

/// Await a database call and record its latency and outcome.
///
/// The result is returned unchanged; failures are recorded, then propagated.
pub async fn track_query<T, E, F>(
    metrics: &dyn MetricsStore,
    query_type: &str,
    query: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = query.await;
    let outcome = if result.is_ok() {
        QueryOutcome::Success
    } else {
        QueryOutcome::Error
    };
    metrics.record_db_query(query_type, outcome, start.elapsed().as_secs_f64());
    result
}
