//! Vitrine API Server Entry Point
//!
//! Loads configuration, connects the record store, search index and cache,
//! starts the index sync workers and serves the Axum HTTP router until
//! Ctrl-C.

use std::sync::Arc;

use tokio::sync::watch;
use vitrine_api::jobs::{index_sync_task, IndexSyncJobConfig};
use vitrine_api::telemetry::{init_tracer, TelemetryConfig};
use vitrine_api::{create_api_router, ApiError, ApiResult, AppConfig, Components};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let config = AppConfig::from_env()?;
    config.validate()?;

    let components = Components::connect(&config).await?;
    let state = components.app_state();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_job = tokio::spawn(index_sync_task(
        Arc::new(components.synchronizer()),
        components.queue.clone(),
        components.sync_metrics.clone(),
        IndexSyncJobConfig::from_settings(&config.sync),
        shutdown_rx,
    ));

    let app = create_api_router(state, &config.api);

    let addr = config.api.bind_addr()?;
    tracing::info!(
        %addr,
        service = %telemetry_config.service_name,
        environment = %telemetry_config.environment,
        "Starting Vitrine API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    // Workers finish their current task, then stop reserving. Unfinished
    // tasks stay in the queue table for the next start.
    let _ = shutdown_tx.send(true);
    components.queue.close().await;
    match sync_job.await {
        Ok(snapshot) => {
            if snapshot.parked > 0 {
                tracing::warn!(parked = snapshot.parked, "propagation tasks parked at shutdown");
            }
        }
        Err(e) => tracing::error!(error = %e, "index sync task failed"),
    }

    Ok(())
}
