use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // HTTP server settings
    pub port: u16,
    pub environment: String,
    pub cors_origin: String,
    pub log_level: String,
    pub shutdown_grace_secs: u64,
    pub persist_api_metrics: bool,

    // Database settings
    pub db_name: String,
    pub db_path: String,
    pub db_pool_max: usize,
    pub db_idle_timeout_ms: u64,
    pub db_acquire_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            environment: "development".to_string(),
            cors_origin: "http://localhost:5173".to_string(),
            log_level: "info".to_string(),
            shutdown_grace_secs: 10,
            persist_api_metrics: true,
            db_name: "dx03".to_string(),
            db_path: "dx03.db".to_string(),
            db_pool_max: 20,
            db_idle_timeout_ms: 30_000,
            db_acquire_timeout_ms: 2_000,
        }
    }
}

impl Config {
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    /// Error detail and stack output are suppressed in production.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.db_idle_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.db_acquire_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Maximum tracing level; unknown values fall back to INFO.
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    load_config_from(|key| std::env::var(key).ok())
}

/// Build a config from an arbitrary key lookup.
///
/// Numbers that fail to parse keep their default.
pub fn load_config_from<F>(lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let port = lookup("PORT")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.port);

    let environment = lookup("APP_ENV").unwrap_or(defaults.environment);

    let cors_origin = lookup("CORS_ORIGIN").unwrap_or(defaults.cors_origin);

    let log_level = lookup("LOG_LEVEL").unwrap_or(defaults.log_level);

    let shutdown_grace_secs = lookup("SHUTDOWN_GRACE_SECS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.shutdown_grace_secs);

    let persist_api_metrics = lookup("PERSIST_API_METRICS")
        .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
        .unwrap_or(defaults.persist_api_metrics);

    // Database settings
    let db_name = lookup("DB_NAME").unwrap_or(defaults.db_name);

    let db_path = lookup("DB_PATH").unwrap_or_else(|| format!("{}.db", db_name));

    let db_pool_max = lookup("DB_POOL_MAX")
        .and_then(|v| v.parse().ok())
        .filter(|max: &usize| *max > 0)
        .unwrap_or(defaults.db_pool_max);

    let db_idle_timeout_ms = lookup("DB_IDLE_TIMEOUT_MS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.db_idle_timeout_ms);

    let db_acquire_timeout_ms = lookup("DB_ACQUIRE_TIMEOUT_MS")
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults.db_acquire_timeout_ms);

    Ok(Config {
        port,
        environment,
        cors_origin,
        log_level,
        shutdown_grace_secs,
        persist_api_metrics,
        db_name,
        db_path,
        db_pool_max,
        db_idle_timeout_ms,
        db_acquire_timeout_ms,
    })
}
