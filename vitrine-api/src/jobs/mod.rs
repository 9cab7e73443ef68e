//! Background Jobs for the Vitrine API
//!
//! - `index_sync`: runs the propagation worker pool and reports queue
//!   depth periodically
//!
//! # Usage
//!
//! ```ignore
//! use vitrine_api::jobs::{index_sync_task, IndexSyncJobConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let handle = tokio::spawn(index_sync_task(sync, queue, metrics, IndexSyncJobConfig::default(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let snapshot = handle.await?;
//! ```

pub mod index_sync;

pub use index_sync::{index_sync_task, IndexSyncJobConfig};
