//! Bulk reindex of the product catalog.
//!
//! Walks every live record in the store and submits an upsert per record
//! to the durable propagation queue. Local sync workers consume the queue
//! while the walk runs, so a catalog larger than the queue capacity is
//! throttled rather than truncated. Tasks still pending when the tool exits
//! are finished by the server's workers.
//!
//! ```text
//! vitrine-reindex --recreate --batch-size 500 --wait
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use vitrine_api::telemetry::{init_tracer, TelemetryConfig};
use vitrine_api::{ApiResult, AppConfig, Components};
use vitrine_sync::{
    recreate_index, reindex_all, wait_until_settled, ReindexOptions, WorkerPool,
    DEFAULT_REINDEX_BATCH_SIZE,
};

/// Rebuild the product search index from the record store.
#[derive(Debug, Parser)]
#[command(name = "vitrine-reindex", version, about)]
struct Args {
    /// Delete and recreate the index with the catalog mapping first.
    #[arg(long)]
    recreate: bool,

    /// Number of record ids read from the store per batch.
    #[arg(long, env = "VITRINE_REINDEX_BATCH_SIZE", default_value_t = DEFAULT_REINDEX_BATCH_SIZE)]
    batch_size: usize,

    /// Seconds one submission waits for room in a full queue.
    #[arg(long, env = "VITRINE_REINDEX_CAPACITY_WAIT_SECS", default_value_t = 60)]
    capacity_wait_secs: u64,

    /// Wait for every queued task to settle and fail if any was parked.
    #[arg(long)]
    wait: bool,
}

#[tokio::main]
async fn main() -> ApiResult<ExitCode> {
    let args = Args::parse();
    init_tracer(&TelemetryConfig::default())?;

    let config = AppConfig::from_env()?;
    config.validate()?;
    let components = Components::connect(&config).await?;

    if args.recreate {
        recreate_index(components.index.as_ref(), &components.mapping).await?;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool = WorkerPool::spawn_with_metrics(
        Arc::new(components.synchronizer()),
        components.queue.clone(),
        config.sync.worker_config(),
        components.sync_metrics.clone(),
        shutdown_rx,
    );

    let options = ReindexOptions::default()
        .with_batch_size(args.batch_size)
        .with_capacity_wait(Duration::from_secs(args.capacity_wait_secs));
    let report = reindex_all(components.store.as_ref(), components.queue.as_ref(), &options).await;

    let settled = if args.wait && report.is_ok() {
        Some(wait_until_settled(components.queue.as_ref(), config.sync.poll_interval).await)
    } else {
        None
    };

    let _ = shutdown_tx.send(true);
    let metrics = pool.join().await;
    let report = report?;
    tracing::info!(
        submitted = report.submitted,
        failed = report.failed,
        applied = metrics.applied,
        retried = metrics.retried,
        parked = metrics.parked,
        "reindex finished"
    );

    let mut failed = report.failed > 0;
    if let Some(settled) = settled {
        let depth = settled?;
        if depth.parked > 0 {
            for task in components.queue.parked().await? {
                tracing::error!(task = ?task, "parked propagation task");
            }
            failed = true;
        }
    }
    if failed {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
