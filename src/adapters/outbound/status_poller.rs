//! Status Poller
//!
//! Terminal replacement for the browser dashboard: fetches `GET /health` on a
//! fixed interval and logs a one-line summary of each report.

use crate::domain::entities::{MemoryUsage, PoolSnapshot};
use crate::infrastructure::ShutdownController;
use serde::Deserialize;
use std::time::Duration;

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Base URL of the backend, e.g. `http://localhost:3000`
    pub base_url: String,
    /// Delay between polls
    pub interval: Duration,
    /// Timeout for each request
    pub timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
}

/// Database section as the watcher reads it.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseView {
    pub status: String,
    pub latency: String,
    #[serde(default)]
    pub connections: Option<PoolSnapshot>,
}

/// The parts of a health report the watcher displays.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusView {
    pub status: String,
    pub timestamp: String,
    pub uptime: f64,
    pub environment: String,
    pub database: DatabaseView,
    pub memory: MemoryUsage,
    #[serde(rename = "responseTime")]
    pub response_time: String,
}

impl StatusView {
    /// One-line human summary.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} env={} uptime={} response={} memory={} / {} db={} latency={}",
            self.status.to_uppercase(),
            self.environment,
            format_uptime(self.uptime),
            self.response_time,
            self.memory.used,
            self.memory.total,
            self.database.status,
            self.database.latency,
        );
        if let Some(c) = &self.database.connections {
            line.push_str(&format!(" connections={}/{}", c.active, c.total));
        }
        line
    }
}

/// Render seconds as `Xh Ym Zs`.
pub fn format_uptime(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{}h {}m {}s", total / 3600, (total % 3600) / 60, total % 60)
}

/// Periodic `GET /health` client.
pub struct StatusPoller {
    client: reqwest::Client,
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(config: PollerConfig) -> Result<Self, PollError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.config.base_url.trim_end_matches('/'))
    }

    /// Fetch the current report. Any non-2xx response is an error.
    pub async fn fetch(&self) -> Result<StatusView, PollError> {
        let response = self.client.get(self.health_url()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status.as_u16()));
        }
        Ok(response.json::<StatusView>().await?)
    }

    /// Poll until shutdown. Returns the number of polls made.
    pub async fn run(&self, shutdown: ShutdownController) -> u64 {
        let mut ticker = tokio::time::interval(self.config.interval);
        let mut polls = 0;

        tracing::info!(
            "watching {} every {:?}",
            self.health_url(),
            self.config.interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.wait() => break,
            }

            polls += 1;
            match self.fetch().await {
                Ok(view) => tracing::info!("{}", view.summary()),
                Err(e) => tracing::warn!("status poll failed: {}", e),
            }
        }

        polls
    }
}
