//! Vitrine Test Utilities
//!
//! Shared test infrastructure for the Vitrine workspace:
//! - Proptest generators for records and search requests
//! - A flaky index client for exercising retry paths
//! - Test fixtures for common catalog scenarios
//! - Custom assertions for Vitrine error classification

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

// Re-export core types for convenience
pub use vitrine_core::{
    CatalogRecord, FailureKind, IndexDocument, IndexError, NewRecord, Price, RecordId,
    RecordPatch, RecordStatus, SearchFilters, SearchPage, SearchRequest, SortField, SortOrder,
    StorageError, Timestamp, ValidationError, VitrineError, VitrineResult,
};
pub use vitrine_search::{InMemoryIndex, IndexMapping};

use vitrine_search::{CreateOutcome, DeleteOutcome, IndexClient, NativeQuery};

// ============================================================================
// MOCK INDEX
// ============================================================================

/// Index client that fails its first `failures` document writes with a
/// transient `Unavailable` error, then delegates to an [`InMemoryIndex`].
///
/// Queries and index administration always delegate.
#[derive(Debug, Clone)]
pub struct FlakyIndex {
    inner: InMemoryIndex,
    remaining: Arc<AtomicU32>,
}

impl FlakyIndex {
    pub fn new(inner: InMemoryIndex, failures: u32) -> Self {
        Self {
            inner,
            remaining: Arc::new(AtomicU32::new(failures)),
        }
    }

    /// The wrapped index, sharing storage with this client.
    pub fn inner(&self) -> &InMemoryIndex {
        &self.inner
    }

    /// Failures still to be injected.
    pub fn remaining_failures(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }

    fn inject(&self, operation: &str) -> VitrineResult<()> {
        let injected = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(IndexError::Unavailable {
                reason: format!("injected failure on {}", operation),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl IndexClient for FlakyIndex {
    fn index_name(&self) -> &str {
        self.inner.index_name()
    }

    async fn exists(&self) -> VitrineResult<bool> {
        self.inner.exists().await
    }

    async fn create_index(&self, mapping: &IndexMapping) -> VitrineResult<CreateOutcome> {
        self.inner.create_index(mapping).await
    }

    async fn delete_index(&self) -> VitrineResult<bool> {
        self.inner.delete_index().await
    }

    async fn upsert(&self, document: &IndexDocument) -> VitrineResult<()> {
        self.inject("upsert")?;
        self.inner.upsert(document).await
    }

    async fn delete(&self, id: RecordId) -> VitrineResult<DeleteOutcome> {
        self.inject("delete")?;
        self.inner.delete(id).await
    }

    async fn query(&self, query: &NativeQuery) -> VitrineResult<SearchPage> {
        self.inner.query(query).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Vitrine types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a valid record id.
    pub fn arb_record_id() -> impl Strategy<Value = RecordId> {
        (1i64..1_000_000).prop_map(RecordId::new)
    }

    /// Generate a valid price of at least one cent.
    pub fn arb_price() -> impl Strategy<Value = Price> {
        (1i64..10_000_000).prop_filter_map("price in range", |cents| Price::from_cents(cents).ok())
    }

    pub fn arb_status() -> impl Strategy<Value = RecordStatus> {
        prop_oneof![Just(RecordStatus::Active), Just(RecordStatus::Inactive)]
    }

    pub fn arb_category() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("tools".to_string()),
            Just("garden".to_string()),
            Just("kitchen".to_string()),
            Just("office".to_string()),
        ]
    }

    pub fn arb_sort_field() -> impl Strategy<Value = SortField> {
        prop_oneof![
            Just(SortField::Price),
            Just(SortField::Name),
            Just(SortField::Sku),
            Just(SortField::CreatedAt),
            Just(SortField::UpdatedAt),
        ]
    }

    pub fn arb_sort_order() -> impl Strategy<Value = SortOrder> {
        prop_oneof![Just(SortOrder::Asc), Just(SortOrder::Desc)]
    }

    /// Generate a record that passes the API field rules.
    pub fn arb_new_record() -> impl Strategy<Value = NewRecord> {
        (
            "[A-Z]{2,4}-[0-9]{1,6}",
            "[A-Za-z][A-Za-z ]{2,40}",
            proptest::option::of("[a-z ]{0,80}"),
            arb_price(),
            arb_category(),
            arb_status(),
        )
            .prop_map(|(sku, name, description, price, category, status)| NewRecord {
                sku,
                name: name.trim_end().to_string(),
                description,
                price,
                category,
                status,
                image_path: None,
            })
            .prop_filter("name keeps three characters", |r| r.name.chars().count() >= 3)
    }

    /// Generate a search request whose filters are valid.
    pub fn arb_search_request() -> impl Strategy<Value = SearchRequest> {
        (
            proptest::option::of("[a-z]{1,10}"),
            proptest::option::of(arb_category()),
            proptest::option::of(arb_status()),
            proptest::option::of(0u32..500),
            proptest::option::of(arb_sort_field()),
            arb_sort_order(),
            1u32..5,
            1u32..=100,
        )
            .prop_map(
                |(q, category, status, min_price, sort, order, page, per_page)| {
                    let min_price = min_price.map(f64::from);
                    let filters = SearchFilters {
                        q,
                        category,
                        status,
                        min_price,
                        max_price: min_price.map(|min| min + 100.0),
                        sort,
                        order,
                    };
                    SearchRequest::new(filters).with_page(page, per_page)
                },
            )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records for common scenarios.

    use super::*;

    /// An active record in the `tools` category.
    pub fn new_record(sku: &str, name: &str, price_cents: i64) -> NewRecord {
        NewRecord {
            sku: sku.to_string(),
            name: name.to_string(),
            description: Some(format!("{} for everyday use", name)),
            price: Price::from_cents(price_cents).expect("fixture price in range"),
            category: "tools".to_string(),
            status: RecordStatus::Active,
            image_path: None,
        }
    }

    pub fn widget() -> NewRecord {
        new_record("W-1", "Widget", 999)
    }

    pub fn gadget() -> NewRecord {
        new_record("G-1", "Gadget", 2_500)
    }

    /// Three records across two categories with distinct prices.
    pub fn small_catalog() -> Vec<NewRecord> {
        vec![
            new_record("T-100", "Hammer", 1_500),
            new_record("T-200", "Wrench", 800),
            NewRecord {
                category: "garden".to_string(),
                ..new_record("G-300", "Rake", 2_200)
            },
        ]
    }

    /// A stored record as the record store would return it.
    pub fn catalog_record(id: i64, record: NewRecord) -> CatalogRecord {
        let now = chrono::Utc::now();
        CatalogRecord {
            id: RecordId::new(id),
            sku: record.sku,
            name: record.name,
            description: record.description,
            price: record.price,
            category: record.category,
            status: record.status,
            image_path: record.image_path,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over Vitrine error classification.

    use super::*;

    /// Assert that a result failed with the given failure kind.
    #[track_caller]
    pub fn assert_failure_kind<T: std::fmt::Debug>(result: &VitrineResult<T>, kind: FailureKind) {
        match result {
            Err(e) => assert_eq!(e.kind(), kind, "wrong failure kind for {:?}", e),
            Ok(value) => panic!("Expected {:?} failure, got Ok({:?})", kind, value),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &VitrineResult<T>) {
        assert_failure_kind(result, FailureKind::NotFound);
    }

    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &VitrineResult<T>) {
        assert_failure_kind(result, FailureKind::Conflict);
    }

    #[track_caller]
    pub fn assert_transient<T: std::fmt::Debug>(result: &VitrineResult<T>) {
        assert_failure_kind(result, FailureKind::Transient);
    }

    /// Assert that the page lists exactly these ids, in order.
    #[track_caller]
    pub fn assert_hit_ids(page: &SearchPage, expected: &[RecordId]) {
        let ids: Vec<RecordId> = page.hits.iter().map(|hit| hit.id).collect();
        assert_eq!(ids, expected, "unexpected hit order");
    }
}

// ============================================================================
// TESTS
// ============================================================================
