//! dx03-backend
//!
//! Composition root: wires the pool, repository, metrics and services
//! together and runs the HTTP server until SIGINT or SIGTERM.

use dx03_backend::adapters::inbound::{AppState, HttpServer};
use dx03_backend::adapters::outbound::{PrometheusMetricsStore, SqliteHealthRepository};
use dx03_backend::application::{HealthService, ReportService};
use dx03_backend::config::load_config;
use dx03_backend::domain::ports::{HealthRepository, MetricsStore};
use dx03_backend::error::StartupError;
use dx03_backend::infrastructure::{shutdown_signal, DbPool, PoolConfig, ShutdownController};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let started_at = Instant::now();

    // Load configuration from environment
    let cfg = load_config()?;

    tracing_subscriber::fmt()
        .with_max_level(cfg.tracing_level())
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting dx03-backend env={} listen={} db={}",
        cfg.environment,
        cfg.listen_addr(),
        cfg.db_path
    );

    // ===== COMPOSITION ROOT =====

    // 1. Outbound adapters
    let pool = DbPool::new(PoolConfig {
        path: cfg.db_path.clone(),
        max_connections: cfg.db_pool_max,
        idle_timeout: cfg.idle_timeout(),
        acquire_timeout: cfg.acquire_timeout(),
        ..Default::default()
    });

    let repo = Arc::new(SqliteHealthRepository::new(pool.clone(), cfg.db_name.clone()));
    if let Err(e) = repo.initialize().await {
        tracing::error!("failed to initialize database: {}", e);
        return Err(StartupError::Schema(e).into());
    }

    let reap_every = (cfg.idle_timeout() / 2).max(Duration::from_secs(1));
    pool.start_cleanup(reap_every);

    let metrics = Arc::new(PrometheusMetricsStore::new().map_err(StartupError::from)?);
    metrics.set_pool_connections(&pool.snapshot());

    // 2. Application services
    let health = Arc::new(HealthService::new(
        repo.clone(),
        metrics.clone(),
        cfg.environment.clone(),
        started_at,
    ));
    let reports = Arc::new(ReportService::new(repo.clone(), metrics.clone()));

    // 3. Inbound adapter
    let state = AppState {
        health,
        reports,
        metrics,
        environment: cfg.environment.clone(),
        expose_errors: !cfg.is_production(),
        persist_api_metrics: cfg.persist_api_metrics,
        cors_origin: cfg.cors_origin.clone(),
    };
    let server = HttpServer::new(cfg.listen_addr(), state)?;

    let shutdown = ShutdownController::new(cfg.shutdown_grace());
    tokio::spawn(shutdown_signal(shutdown.clone()));

    server.run(shutdown.clone()).await?;

    // 4. Teardown
    shutdown
        .bounded("database pool close", repo.close())
        .await;

    tracing::info!("shutdown complete");
    Ok(())
}
