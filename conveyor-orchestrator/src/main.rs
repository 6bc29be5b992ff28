use std::sync::Arc;

use anyhow::Context;
use conveyor_runner::{PipelineRunCoordinator, PodmanExecutor, executor::podman};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod recorder;
pub mod repository;
pub mod service;

use crate::config::Config;
use crate::recorder::PgRunRecorder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "conveyor_orchestrator=debug,conveyor_runner=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Conveyor Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Runs fail job by job without podman, but the API stays useful
    if let Err(e) = podman::check_podman_available(&config.executor).await {
        tracing::warn!("{:#}", e);
    }

    tracing::info!("Connecting to database...");

    // Create database connection pool
    let pool = db::create_pool(&config.database_url, config.max_connections)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    // Run migrations
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    // Nothing drives runs a previous process left RUNNING
    let interrupted = service::run_service::recover_interrupted_runs(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to recover interrupted runs: {:?}", e))?;
    if interrupted > 0 {
        tracing::warn!("Marked {} interrupted pipeline run(s) as FAILED", interrupted);
    }

    let coordinator = PipelineRunCoordinator::new(
        Arc::new(PodmanExecutor::new(config.executor.clone())),
        Arc::new(PgRunRecorder::new(pool.clone())),
    );

    // Build router with all API endpoints
    let app = api::create_router(api::AppState { pool, coordinator });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
