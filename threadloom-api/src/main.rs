//! Threadloom API Server Entry Point
//!
//! Bootstraps configuration, connects the store, and starts the Axum HTTP
//! server.

use std::net::SocketAddr;
use std::sync::Arc;

use threadloom_api::telemetry::{init_tracing, TelemetryConfig};
use threadloom_api::{create_router, ApiConfig, ApiError, ApiResult, AppState, SegmentingGenerator};
use threadloom_core::{GovernanceConfig, SystemClock};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let governance = GovernanceConfig::from_env()?;
    let api_config = ApiConfig::from_env()?;
    let addr = api_config.bind_addr()?;

    tracing::info!(
        daily_limit = governance.daily_limit,
        monthly_limit = governance.monthly_limit,
        store = ?api_config.store_backend,
        webhook_configured = api_config.webhook_secret.is_some(),
        "Configuration loaded"
    );

    let state = AppState::connect(
        governance,
        api_config,
        Arc::new(SegmentingGenerator),
        Arc::new(SystemClock),
    )
    .await?;

    let app = create_router(state, &telemetry_config)
        .into_make_service_with_connect_info::<SocketAddr>();

    tracing::info!(%addr, "Starting Threadloom API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on ctrl-c; in-flight requests are drained before `serve` returns.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
