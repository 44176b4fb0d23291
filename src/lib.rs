//! dx03-backend Library
//!
//! Health and metrics backend: health reports backed by SQLite, hourly API
//! rollups, and Prometheus exposition. Exposed as a library for the binaries
//! and integration tests.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::inbound::{build_app, build_router, AppState, HttpServer};
pub use adapters::outbound::{PrometheusMetricsStore, SqliteHealthRepository, StatusPoller};
pub use application::{HealthService, ReportService};
pub use config::{load_config, Config};
pub use domain::ports::{HealthRepository, MetricsStore};
pub use error::{ApiError, DatabaseError, PoolError, StartupError};
