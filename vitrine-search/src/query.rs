//! Query builder: translates a [`SearchRequest`] into the index's native
//! query representation.
//!
//! The native query is kept as a typed structure so both the HTTP client
//! (via [`NativeQuery::to_body`]) and the in-memory index can execute it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use vitrine_core::{SearchRequest, SortField, SortOrder};

/// Boost applied to `name` over `description` in relevance scoring.
pub const NAME_BOOST: u32 = 3;

/// Field used as the deterministic tie-breaker of sorted queries.
pub const TIE_BREAKER_FIELD: &str = "id";

/// One query clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    /// Scored relevance match over several fields; `(field, boost)` pairs.
    MultiMatch {
        query: String,
        fields: Vec<(String, u32)>,
    },
    /// Unscored exact match.
    Term { field: String, value: String },
    /// Unscored inclusive numeric range.
    Range {
        field: String,
        gte: Option<f64>,
        lte: Option<f64>,
    },
}

impl Clause {
    fn to_value(&self) -> Value {
        match self {
            Clause::MultiMatch { query, fields } => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|(field, boost)| {
                        if *boost > 1 {
                            format!("{}^{}", field, boost)
                        } else {
                            field.clone()
                        }
                    })
                    .collect();
                json!({ "multi_match": { "query": query, "fields": fields } })
            }
            Clause::Term { field, value } => json!({ "term": { field.as_str(): value } }),
            Clause::Range { field, gte, lte } => {
                let mut bounds = Map::new();
                if let Some(gte) = gte {
                    bounds.insert("gte".to_string(), json!(gte));
                }
                if let Some(lte) = lte {
                    bounds.insert("lte".to_string(), json!(lte));
                }
                json!({ "range": { field.as_str(): bounds } })
            }
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortClause {
    pub field: String,
    pub order: SortOrder,
}

impl SortClause {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            field: field.into(),
            order,
        }
    }
}

/// Index-native query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeQuery {
    pub from: u64,
    pub size: u32,
    /// Scored clauses.
    pub must: Vec<Clause>,
    /// Unscored clauses.
    pub filter: Vec<Clause>,
    /// Empty means relevance order.
    pub sort: Vec<SortClause>,
}

impl NativeQuery {
    pub fn is_relevance_ordered(&self) -> bool {
        self.sort.is_empty()
    }

    /// Elasticsearch request body.
    pub fn to_body(&self) -> Value {
        let query = if self.must.is_empty() && self.filter.is_empty() {
            json!({ "match_all": {} })
        } else {
            let mut bool_query = Map::new();
            if !self.must.is_empty() {
                bool_query.insert(
                    "must".to_string(),
                    Value::Array(self.must.iter().map(Clause::to_value).collect()),
                );
            }
            if !self.filter.is_empty() {
                bool_query.insert(
                    "filter".to_string(),
                    Value::Array(self.filter.iter().map(Clause::to_value).collect()),
                );
            }
            json!({ "bool": bool_query })
        };

        let mut body = json!({
            "from": self.from,
            "size": self.size,
            "query": query,
        });
        if !self.sort.is_empty() {
            let sort: Vec<Value> = self
                .sort
                .iter()
                .map(|s| json!({ s.field.as_str(): { "order": s.order.as_str() } }))
                .collect();
            body["sort"] = Value::Array(sort);
        }
        body
    }
}

/// Index field a [`SortField`] orders by. Text fields sort on their
/// `keyword` sub-field.
pub fn sort_target(field: SortField) -> &'static str {
    match field {
        SortField::Price => "price",
        SortField::Name => "name.keyword",
        SortField::Sku => "sku.keyword",
        SortField::CreatedAt => "created_at",
        SortField::UpdatedAt => "updated_at",
    }
}

/// Translates search requests into native queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder;

impl QueryBuilder {
    /// Build the native query for `request`. Pure; the request is expected
    /// to be validated already.
    pub fn build(request: &SearchRequest) -> NativeQuery {
        let filters = &request.filters;
        let mut must = Vec::new();
        let mut filter = Vec::new();

        if let Some(q) = filters.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            must.push(Clause::MultiMatch {
                query: q.to_string(),
                fields: vec![
                    ("name".to_string(), NAME_BOOST),
                    ("description".to_string(), 1),
                ],
            });
        }

        if let Some(category) = filters.category.as_deref().filter(|c| !c.is_empty()) {
            filter.push(Clause::Term {
                field: "category.keyword".to_string(),
                value: category.to_string(),
            });
        }

        if let Some(status) = filters.status {
            filter.push(Clause::Term {
                field: "status".to_string(),
                value: status.as_str().to_string(),
            });
        }

        if filters.min_price.is_some() || filters.max_price.is_some() {
            filter.push(Clause::Range {
                field: "price".to_string(),
                gte: filters.min_price,
                lte: filters.max_price,
            });
        }

        let sort = match filters.sort {
            Some(field) => vec![
                SortClause::new(sort_target(field), filters.order),
                SortClause::new(TIE_BREAKER_FIELD, SortOrder::Asc),
            ],
            None => Vec::new(),
        };

        NativeQuery {
            from: request.offset(),
            size: request.per_page,
            must,
            filter,
            sort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vitrine_core::{RecordStatus, SearchFilters};

    fn request(filters: SearchFilters) -> SearchRequest {
        SearchRequest::new(filters)
    }

    #[test]
    fn test_no_filters_is_match_all() {
        let query = QueryBuilder::build(&SearchRequest::default());
        assert!(query.must.is_empty());
        assert!(query.filter.is_empty());
        assert!(query.is_relevance_ordered());

        let body = query.to_body();
        assert_eq!(body["query"], json!({ "match_all": {} }));
        assert_eq!(body["from"], 0);
        assert_eq!(body["size"], 15);
        assert!(body.get("sort").is_none());
    }

    #[test]
    fn test_text_query_boosts_name() {
        let body = QueryBuilder::build(&request(SearchFilters {
            q: Some("widget".into()),
            ..Default::default()
        }))
        .to_body();
        assert_eq!(
            body["query"]["bool"]["must"][0],
            json!({ "multi_match": { "query": "widget", "fields": ["name^3", "description"] } })
        );
        assert!(body["query"]["bool"].get("filter").is_none());
    }

    #[test]
    fn test_full_filter_set() {
        let req = request(SearchFilters {
            category: Some("tools".into()),
            status: Some(RecordStatus::Active),
            min_price: Some(5.0),
            max_price: Some(20.0),
            sort: Some(SortField::Price),
            order: SortOrder::Asc,
            ..Default::default()
        })
        .with_page(1, 10);

        let body = QueryBuilder::build(&req).to_body();
        assert_eq!(
            body,
            json!({
                "from": 0,
                "size": 10,
                "query": { "bool": { "filter": [
                    { "term": { "category.keyword": "tools" } },
                    { "term": { "status": "active" } },
                    { "range": { "price": { "gte": 5.0, "lte": 20.0 } } }
                ] } },
                "sort": [
                    { "price": { "order": "asc" } },
                    { "id": { "order": "asc" } }
                ]
            })
        );
    }

    #[test]
    fn test_single_price_bound() {
        let body = QueryBuilder::build(&request(SearchFilters {
            max_price: Some(20.0),
            ..Default::default()
        }))
        .to_body();
        assert_eq!(
            body["query"]["bool"]["filter"][0],
            json!({ "range": { "price": { "lte": 20.0 } } })
        );
    }

    #[test]
    fn test_text_sorts_use_keyword_subfield() {
        let body = QueryBuilder::build(&request(SearchFilters {
            sort: Some(SortField::Name),
            order: SortOrder::Desc,
            ..Default::default()
        }))
        .to_body();
        assert_eq!(body["sort"][0], json!({ "name.keyword": { "order": "desc" } }));
        assert_eq!(sort_target(SortField::Sku), "sku.keyword");
    }

    #[test]
    fn test_blank_text_is_ignored() {
        let query = QueryBuilder::build(&request(SearchFilters {
            q: Some("   ".into()),
            category: Some("".into()),
            ..Default::default()
        }));
        assert!(query.must.is_empty());
        assert!(query.filter.is_empty());
    }

    proptest! {
        #[test]
        fn prop_window_follows_pagination(page in 1u32..500, per_page in 1u32..=100) {
            let query = QueryBuilder::build(&SearchRequest::default().with_page(page, per_page));
            prop_assert_eq!(query.from, u64::from(page - 1) * u64::from(per_page));
            prop_assert_eq!(query.size, per_page);
        }
    }
}
