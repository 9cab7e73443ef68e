//! In-process index used by tests and local runs.
//!
//! Executes [`NativeQuery`] with the same observable semantics the HTTP
//! client relies on: lowercase token matching with a boosted `name`,
//! exact `keyword` filters, inclusive price ranges, keyword sorting with
//! the `id` tie-breaker, and `IndexMissing` when no index exists.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use vitrine_core::{
    IndexDocument, IndexError, RecordId, SearchHit, SearchPage, SortOrder, VitrineResult,
};

use crate::client::{CreateOutcome, DeleteOutcome, IndexClient};
use crate::mapping::IndexMapping;
use crate::query::{Clause, NativeQuery, SortClause};

type Documents = BTreeMap<RecordId, IndexDocument>;

/// In-memory index. `None` state means the index does not exist.
/// Cloning shares the same storage.
#[derive(Debug, Clone)]
pub struct InMemoryIndex {
    name: String,
    state: Arc<RwLock<Option<Documents>>>,
    writes: Arc<AtomicU64>,
}

impl InMemoryIndex {
    /// An index client whose index has not been created yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(None)),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// An index client whose index already exists (empty).
    pub fn created(name: impl Into<String>) -> Self {
        let index = Self::new(name);
        if let Ok(mut state) = index.state.write() {
            *state = Some(Documents::new());
        }
        index
    }

    /// Stored document for `id`, if any.
    pub fn document(&self, id: RecordId) -> Option<IndexDocument> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.as_ref().and_then(|docs| docs.get(&id).cloned()))
    }

    /// Number of stored documents (0 if the index is missing).
    pub fn len(&self) -> usize {
        self.state
            .read()
            .ok()
            .and_then(|state| state.as_ref().map(|docs| docs.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful document writes and removals.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn missing(&self) -> IndexError {
        IndexError::IndexMissing {
            index: self.name.clone(),
        }
    }

    fn poisoned() -> IndexError {
        IndexError::Unavailable {
            reason: "index lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl IndexClient for InMemoryIndex {
    fn index_name(&self) -> &str {
        &self.name
    }

    async fn exists(&self) -> VitrineResult<bool> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.is_some())
    }

    async fn create_index(&self, _mapping: &IndexMapping) -> VitrineResult<CreateOutcome> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        if state.is_some() {
            return Ok(CreateOutcome::AlreadyExists);
        }
        *state = Some(Documents::new());
        Ok(CreateOutcome::Created)
    }

    async fn delete_index(&self) -> VitrineResult<bool> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        Ok(state.take().is_some())
    }

    async fn upsert(&self, document: &IndexDocument) -> VitrineResult<()> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let docs = state.as_mut().ok_or_else(|| self.missing())?;
        docs.insert(document.id, document.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, id: RecordId) -> VitrineResult<DeleteOutcome> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        let removed = state.as_mut().and_then(|docs| docs.remove(&id));
        match removed {
            Some(_) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                Ok(DeleteOutcome::Deleted)
            }
            None => Ok(DeleteOutcome::NotFound),
        }
    }

    async fn query(&self, query: &NativeQuery) -> VitrineResult<SearchPage> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        let docs = state.as_ref().ok_or_else(|| self.missing())?;

        let mut matches: Vec<(f64, &IndexDocument)> = docs
            .values()
            .filter(|doc| query.filter.iter().all(|clause| passes(clause, doc)))
            .filter_map(|doc| score(&query.must, doc).map(|s| (s, doc)))
            .collect();

        if query.is_relevance_ordered() {
            matches.sort_by(|(sa, a), (sb, b)| {
                sb.partial_cmp(sa)
                    .unwrap_or(CmpOrdering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
        } else {
            matches.sort_by(|(_, a), (_, b)| compare_by(&query.sort, a, b));
        }

        let total = matches.len() as u64;
        let from = usize::try_from(query.from).unwrap_or(usize::MAX);
        let hits = matches
            .into_iter()
            .skip(from)
            .take(query.size as usize)
            .map(|(s, doc)| SearchHit {
                id: doc.id,
                score: query.is_relevance_ordered().then_some(s),
                document: doc.clone(),
            })
            .collect();

        Ok(SearchPage { total, hits })
    }
}

// ============================================================================
// EVALUATION
// ============================================================================

/// Lowercased alphanumeric tokens.
fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn text_field<'a>(doc: &'a IndexDocument, field: &str) -> Option<&'a str> {
    match field {
        "name" => Some(&doc.name),
        "description" => doc.description.as_deref(),
        "sku" => Some(&doc.sku),
        "category" => Some(&doc.category),
        _ => None,
    }
}

fn keyword_field<'a>(doc: &'a IndexDocument, field: &str) -> Option<&'a str> {
    match field {
        "sku.keyword" => Some(&doc.sku),
        "name.keyword" => Some(&doc.name),
        "category.keyword" => Some(&doc.category),
        "status" => Some(doc.status.as_str()),
        _ => None,
    }
}

fn numeric_field(doc: &IndexDocument, field: &str) -> Option<f64> {
    match field {
        "price" => Some(doc.price),
        "id" => Some(doc.id.get() as f64),
        _ => None,
    }
}

fn passes(clause: &Clause, doc: &IndexDocument) -> bool {
    match clause {
        Clause::Term { field, value } => keyword_field(doc, field) == Some(value.as_str()),
        Clause::Range { field, gte, lte } => match numeric_field(doc, field) {
            Some(v) => gte.map_or(true, |min| v >= min) && lte.map_or(true, |max| v <= max),
            None => false,
        },
        Clause::MultiMatch { .. } => score(std::slice::from_ref(clause), doc).is_some(),
    }
}

/// Relevance of `doc` for the scored clauses; `None` if any clause misses.
/// A multi-match scores as its best field (matched tokens times boost).
fn score(must: &[Clause], doc: &IndexDocument) -> Option<f64> {
    let mut total = 0.0;
    for clause in must {
        match clause {
            Clause::MultiMatch { query, fields } => {
                let wanted = tokens(query);
                let best = fields
                    .iter()
                    .map(|(field, boost)| {
                        let have = text_field(doc, field).map(tokens).unwrap_or_default();
                        let matched = wanted.iter().filter(|t| have.contains(t)).count();
                        (matched as u32 * boost) as f64
                    })
                    .fold(0.0, f64::max);
                if best == 0.0 {
                    return None;
                }
                total += best;
            }
            other => {
                if !passes(other, doc) {
                    return None;
                }
            }
        }
    }
    Some(if must.is_empty() { 1.0 } else { total })
}

fn compare_by(sort: &[SortClause], a: &IndexDocument, b: &IndexDocument) -> CmpOrdering {
    for clause in sort {
        let ordering = compare_field(&clause.field, a, b);
        let ordering = match clause.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        };
        if ordering != CmpOrdering::Equal {
            return ordering;
        }
    }
    CmpOrdering::Equal
}

fn compare_field(field: &str, a: &IndexDocument, b: &IndexDocument) -> CmpOrdering {
    match field {
        "created_at" => a.created_at.cmp(&b.created_at),
        "updated_at" => a.updated_at.cmp(&b.updated_at),
        "id" => a.id.cmp(&b.id),
        _ => {
            if let (Some(x), Some(y)) = (numeric_field(a, field), numeric_field(b, field)) {
                return x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal);
            }
            keyword_field(a, field).cmp(&keyword_field(b, field))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBuilder;
    use chrono::Utc;
    use vitrine_core::{RecordStatus, SearchFilters, SearchRequest, SortField};

    fn doc(id: i64, name: &str, price: f64, category: &str) -> IndexDocument {
        let now = Utc::now();
        IndexDocument {
            id: RecordId::new(id),
            sku: format!("SKU{}", id),
            name: name.to_string(),
            description: None,
            price,
            category: category.to_string(),
            status: RecordStatus::Active,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    async fn seeded() -> VitrineResult<InMemoryIndex> {
        let index = InMemoryIndex::created("products");
        index.upsert(&doc(1, "Steel Hammer", 15.0, "tools")).await?;
        index.upsert(&doc(2, "Widget", 10.0, "tools")).await?;
        index.upsert(&doc(3, "Widget Pro", 25.0, "tools")).await?;
        index.upsert(&doc(4, "Garden Widget", 8.0, "garden")).await?;
        let mut described = doc(5, "Clamp", 12.0, "tools");
        described.description = Some("Holds a widget in place".to_string());
        index.upsert(&described).await?;
        Ok(index)
    }

    fn search(filters: SearchFilters) -> NativeQuery {
        QueryBuilder::build(&SearchRequest::new(filters))
    }

    #[tokio::test]
    async fn test_missing_index_is_reported() {
        let index = InMemoryIndex::new("products");
        let err = index
            .query(&search(SearchFilters::default()))
            .await
            .expect_err("index does not exist");
        assert!(matches!(
            err,
            vitrine_core::VitrineError::Index(IndexError::IndexMissing { .. })
        ));
        assert_eq!(
            index.delete(RecordId::new(1)).await.expect("delete"),
            DeleteOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_create_is_idempotent() -> VitrineResult<()> {
        let index = InMemoryIndex::new("products");
        let mapping = IndexMapping::catalog();
        assert_eq!(index.create_index(&mapping).await?, CreateOutcome::Created);
        assert_eq!(index.create_index(&mapping).await?, CreateOutcome::AlreadyExists);
        assert!(index.delete_index().await?);
        assert!(!index.delete_index().await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_name_matches_outrank_description_matches() -> VitrineResult<()> {
        let index = seeded().await?;
        let page = index
            .query(&search(SearchFilters {
                q: Some("widget".into()),
                ..Default::default()
            }))
            .await?;
        assert_eq!(page.total, 4);
        assert_eq!(page.ids().last(), Some(&RecordId::new(5)));
        Ok(())
    }

    #[tokio::test]
    async fn test_filters_and_price_sort() -> VitrineResult<()> {
        let index = seeded().await?;
        let page = index
            .query(&search(SearchFilters {
                category: Some("tools".into()),
                min_price: Some(5.0),
                max_price: Some(20.0),
                sort: Some(SortField::Price),
                ..Default::default()
            }))
            .await?;
        assert_eq!(
            page.ids(),
            vec![RecordId::new(2), RecordId::new(5), RecordId::new(1)]
        );
        assert!(page.hits.iter().all(|h| h.score.is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn test_pagination_window() -> VitrineResult<()> {
        let index = seeded().await?;
        let request = SearchRequest::new(SearchFilters {
            sort: Some(SortField::Price),
            order: SortOrder::Desc,
            ..Default::default()
        })
        .with_page(2, 2);
        let page = index.query(&QueryBuilder::build(&request)).await?;
        assert_eq!(page.total, 5);
        assert_eq!(page.ids(), vec![RecordId::new(5), RecordId::new(2)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_upsert_overwrites_and_delete_removes() -> VitrineResult<()> {
        let index = seeded().await?;
        index.upsert(&doc(2, "Gadget", 10.0, "tools")).await?;
        assert_eq!(index.len(), 5);
        assert_eq!(index.document(RecordId::new(2)).map(|d| d.name), Some("Gadget".into()));

        assert_eq!(index.delete(RecordId::new(2)).await?, DeleteOutcome::Deleted);
        assert_eq!(index.delete(RecordId::new(2)).await?, DeleteOutcome::NotFound);
        assert!(index.document(RecordId::new(2)).is_none());
        Ok(())
    }
}
