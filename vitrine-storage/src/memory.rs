//! In-memory record store for tests and local development.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use vitrine_core::{
    CatalogRecord, LifecycleEvent, NewRecord, RecordId, RecordPatch, StorageError,
    VitrineResult,
};

use crate::record_store::{Committed, RecordPage, RecordStore};

/// Record store backed by a `BTreeMap`, enforcing SKU uniqueness across
/// live and soft-deleted records alike.
#[derive(Debug, Clone)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<BTreeMap<RecordId, CatalogRecord>>>,
    next_id: Arc<AtomicI64>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }
}

impl InMemoryRecordStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, soft-deleted ones included.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all stored data.
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }

    fn ensure_unique_sku(
        records: &BTreeMap<RecordId, CatalogRecord>,
        sku: &str,
        except: Option<RecordId>,
    ) -> Result<(), StorageError> {
        let taken = records
            .values()
            .any(|r| r.sku == sku && Some(r.id) != except);
        if taken {
            return Err(StorageError::DuplicateSku {
                sku: sku.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(
        &self,
        id: RecordId,
        include_soft_deleted: bool,
    ) -> VitrineResult<Option<CatalogRecord>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records
            .get(&id)
            .filter(|r| include_soft_deleted || r.is_live())
            .cloned())
    }

    async fn insert(&self, new: NewRecord) -> VitrineResult<Committed<CatalogRecord>> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        Self::ensure_unique_sku(&records, &new.sku, None)?;

        let id = RecordId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let record = CatalogRecord {
            id,
            sku: new.sku,
            name: new.name,
            description: new.description,
            price: new.price,
            category: new.category,
            status: new.status,
            image_path: new.image_path,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        records.insert(id, record.clone());
        Ok(Committed::new(record, LifecycleEvent::Created(id)))
    }

    async fn update(
        &self,
        id: RecordId,
        patch: RecordPatch,
    ) -> VitrineResult<Committed<CatalogRecord>> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(sku) = &patch.sku {
            Self::ensure_unique_sku(&records, sku, Some(id))?;
        }
        let record = records.get_mut(&id).ok_or(StorageError::NotFound { id })?;
        patch.apply_to(record);
        record.updated_at = Utc::now();
        Ok(Committed::new(record.clone(), LifecycleEvent::Updated(id)))
    }

    async fn soft_delete(&self, id: RecordId) -> VitrineResult<Committed<CatalogRecord>> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        let record = records
            .get_mut(&id)
            .filter(|r| r.is_live())
            .ok_or(StorageError::NotFound { id })?;
        let now = Utc::now();
        record.deleted_at = Some(now);
        record.updated_at = now;
        Ok(Committed::new(record.clone(), LifecycleEvent::SoftDeleted(id)))
    }

    async fn restore(&self, id: RecordId) -> VitrineResult<Committed<CatalogRecord>> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        let record = records.get_mut(&id).ok_or(StorageError::NotFound { id })?;
        if record.is_live() {
            return Err(StorageError::InvalidState {
                id,
                action: "restored".to_string(),
                reason: "record is not deleted".to_string(),
            }
            .into());
        }
        record.deleted_at = None;
        record.updated_at = Utc::now();
        Ok(Committed::new(record.clone(), LifecycleEvent::Restored(id)))
    }

    async fn hard_delete(&self, id: RecordId) -> VitrineResult<Committed<RecordId>> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        records.remove(&id).ok_or(StorageError::NotFound { id })?;
        Ok(Committed::new(id, LifecycleEvent::HardDeleted(id)))
    }

    async fn list(&self, page: u32, per_page: u32) -> VitrineResult<RecordPage> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        let live: Vec<&CatalogRecord> = records.values().filter(|r| r.is_live()).collect();
        let skip = (page.max(1) as usize - 1) * per_page as usize;
        let data = live
            .iter()
            .skip(skip)
            .take(per_page as usize)
            .map(|r| (*r).clone())
            .collect();
        Ok(RecordPage {
            data,
            total: live.len() as u64,
            page: page.max(1),
            per_page,
        })
    }

    async fn live_ids_after(
        &self,
        after: Option<RecordId>,
        limit: usize,
    ) -> VitrineResult<Vec<RecordId>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records
            .values()
            .filter(|r| r.is_live() && after.map_or(true, |a| r.id > a))
            .take(limit)
            .map(|r| r.id)
            .collect())
    }
}
