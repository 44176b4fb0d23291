mod prometheus_metrics_store;
mod sqlite_health_repo;
mod status_poller;

pub use prometheus_metrics_store::{PrometheusMetricsStore, LATENCY_BUCKETS};
pub use sqlite_health_repo::SqliteHealthRepository;
pub use status_poller::{format_uptime, PollError, PollerConfig, StatusPoller, StatusView};
