//! Shared application state for Axum routers.

use crate::impl_from_ref;
use crate::services::{CatalogService, IndexService, SyncService};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Record CRUD, cached reads and search.
    pub catalog: CatalogService,
    /// Search index administration.
    pub index: IndexService,
    /// Propagation queue status.
    pub sync: SyncService,
    pub start_time: std::time::Instant,
}

impl_from_ref!(CatalogService, catalog);
impl_from_ref!(IndexService, index);
impl_from_ref!(SyncService, sync);
