//! Loader Server - Main entry point

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use loader_common::logging::{init_logging, LogConfig};
use serde_json::json;
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tracing::{info, warn};

use loader_server::{
    config::Config,
    db::CompendiumStore,
    extract::{DockerCli, ExtractionOrchestrator},
    features::{self, FeatureState},
    middleware,
    notify::Notifier,
    staging::Acquirer,
    startup,
    zenodo::ZenodoClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let log_config = LogConfig::from_env()?
        .with_filter_directives("loader_server=debug,tower_http=debug,sqlx=info");
    init_logging(&log_config)?;

    info!("Starting loader server");

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    // Staging directories must exist before any intake is accepted
    tokio::fs::create_dir_all(config.staging.incoming_dir())
        .await
        .context("Failed to create incoming directory")?;
    tokio::fs::create_dir_all(config.staging.compendium_dir())
        .await
        .context("Failed to create compendium staging directory")?;

    // Readiness gate, step 1: persistence. Exhausting the backoff cap is
    // fatal; the process must not serve traffic against a store it cannot
    // reach.
    let db_pool = startup::connect_database(&config.database)
        .await
        .context("Giving up on the database connection")?;
    info!("Database connection pool established");

    // Run migrations
    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    info!("Database migrations completed");

    // Readiness gate, step 2: container runtime. Degraded is tolerated;
    // individual extractions fail until the runtime recovers.
    let store = CompendiumStore::new(db_pool.clone());
    let runtime = Arc::new(DockerCli::new(config.extraction.docker_binary.clone()));
    let orchestrator = Arc::new(ExtractionOrchestrator::new(
        runtime,
        Arc::new(store.clone()),
        config.extraction.clone(),
    ));
    if !orchestrator.prepare().await {
        warn!("extraction runtime degraded; intake stays open");
    }

    let config = Arc::new(config);

    // Create application state
    let state = FeatureState {
        store,
        zenodo: ZenodoClient::new(&config.zenodo)?,
        acquirer: Acquirer::new(&config.staging, &config.zenodo)?,
        dispatcher: orchestrator,
        notifier: Notifier::from_config(&config.notify),
        config: Arc::clone(&config),
    };

    // Build the application router
    let app = create_router(state, db_pool);

    // Create socket address
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Create the application router with all routes and middleware
fn create_router(state: FeatureState, db: PgPool) -> Router {
    let feature_routes = features::router(state);

    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(service_status))
        .with_state(db)
        .nest("/api/v1", feature_routes)
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer())
}

/// Health check handler
async fn health_check(State(db): State<PgPool>) -> Result<Response, StatusCode> {
    // Check database connectivity
    match sqlx::query("SELECT 1").fetch_one(&db).await {
        Ok(_) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}

/// Service information handler
async fn service_status() -> impl IntoResponse {
    Json(json!({
        "service": "loader",
        "version": env!("CARGO_PKG_VERSION"),
        "api_version": "v1"
    }))
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // In-flight extraction jobs are deliberately abandoned here: their
    // records stay `loading` and are reaped by operator tooling, never
    // resurrected as terminal without re-verification.
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
