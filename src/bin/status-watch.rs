//! status-watch
//!
//! Polls a running backend's `GET /health` and logs a one-line summary of
//! each report until interrupted.

use dx03_backend::adapters::outbound::{PollerConfig, StatusPoller};
use dx03_backend::infrastructure::{shutdown_signal, ShutdownController};
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let base_url =
        std::env::var("WATCH_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let interval_secs = std::env::var("WATCH_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(30);
    let log_level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let poller = StatusPoller::new(PollerConfig {
        base_url,
        interval: Duration::from_secs(interval_secs),
        ..Default::default()
    })?;

    let shutdown = ShutdownController::default();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let polls = poller.run(shutdown).await;
    tracing::info!("stopped after {} polls", polls);
    Ok(())
}
