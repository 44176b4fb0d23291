//! Adapters Layer
//!
//! Inbound adapters drive the application (HTTP); outbound adapters are
//! driven by it (SQLite, Prometheus, the status watcher's HTTP client).

pub mod inbound;
pub mod outbound;
