//! Record store adapter trait.
//!
//! The record store is the authority for catalog records. Every mutation
//! returns the committed value together with the [`LifecycleEvent`] it
//! produced; callers publish that event to the lifecycle handlers.

use ::async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vitrine_core::{
    CatalogRecord, LifecycleEvent, NewRecord, RecordId, RecordPatch, VitrineResult,
};

/// A committed mutation and the lifecycle event it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    pub value: T,
    pub event: LifecycleEvent,
}

impl<T> Committed<T> {
    pub fn new(value: T, event: LifecycleEvent) -> Self {
        Self { value, event }
    }
}

/// One page of a record listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RecordPage {
    pub data: Vec<CatalogRecord>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl RecordPage {
    pub fn last_page(&self) -> u32 {
        if self.per_page == 0 {
            return 1;
        }
        let pages = self.total.div_ceil(u64::from(self.per_page));
        pages.max(1) as u32
    }
}

/// Async record store for catalog records.
///
/// Implementations enforce SKU uniqueness and own id and timestamp
/// assignment.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record. Soft-deleted records are only returned when
    /// `include_soft_deleted` is set.
    async fn get(
        &self,
        id: RecordId,
        include_soft_deleted: bool,
    ) -> VitrineResult<Option<CatalogRecord>>;

    /// Insert a new record.
    async fn insert(&self, record: NewRecord) -> VitrineResult<Committed<CatalogRecord>>;

    /// Update a record (soft-deleted records may be updated too).
    async fn update(
        &self,
        id: RecordId,
        patch: RecordPatch,
    ) -> VitrineResult<Committed<CatalogRecord>>;

    /// Mark a live record as deleted.
    async fn soft_delete(&self, id: RecordId) -> VitrineResult<Committed<CatalogRecord>>;

    /// Clear the soft-delete marker of a record.
    async fn restore(&self, id: RecordId) -> VitrineResult<Committed<CatalogRecord>>;

    /// Remove a record permanently, soft-deleted or not.
    async fn hard_delete(&self, id: RecordId) -> VitrineResult<Committed<RecordId>>;

    /// Page through live records ordered by id.
    async fn list(&self, page: u32, per_page: u32) -> VitrineResult<RecordPage>;

    /// Ids of live records greater than `after`, ascending, at most `limit`.
    async fn live_ids_after(
        &self,
        after: Option<RecordId>,
        limit: usize,
    ) -> VitrineResult<Vec<RecordId>>;

    /// Cheap connectivity check for readiness.
    async fn ping(&self) -> VitrineResult<()> {
        Ok(())
    }
}
