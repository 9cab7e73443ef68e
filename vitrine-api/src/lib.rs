//! Vitrine API - HTTP Layer and Service Wiring
//!
//! This crate exposes the product catalog over REST (Axum). Writes go to the
//! PostgreSQL record store and publish lifecycle events; reads go through the
//! cache coordinator; search queries run against the Elasticsearch index that
//! the background sync workers keep up to date.

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod jobs;
pub mod macros;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod services;
pub mod state;
pub mod task_queue;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use bootstrap::Components;
pub use config::{ApiConfig, AppConfig};
pub use db::{DbConfig, PgRecordStore};
pub use error::{ApiError, ApiResult, ErrorCode};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use services::{CatalogService, IndexService, Mutation, SyncService};
pub use state::AppState;
pub use task_queue::PgPropagationQueue;
pub use types::*;
