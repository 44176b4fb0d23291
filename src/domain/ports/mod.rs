mod health_repository;
mod metrics_store;

pub use health_repository::HealthRepository;
pub use metrics_store::MetricsStore;
