//! Search request and result model.
//!
//! A [`SearchRequest`] is the engine-independent description of a catalog
//! search; the search crate turns it into the index's native query.

use crate::error::ValidationError;
use crate::record::{IndexDocument, RecordId, RecordStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Page used when the caller does not ask for one.
pub const DEFAULT_PAGE: u32 = 1;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PER_PAGE: u32 = 15;

/// Largest page size a caller may request.
pub const MAX_PER_PAGE: u32 = 100;

/// Deepest hit a page may reach (`from + size`). Matches the search
/// engine's default `index.max_result_window`.
pub const MAX_RESULT_WINDOW: u64 = 10_000;

// ============================================================================
// SORTING
// ============================================================================

/// Fields a search may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Price,
    Name,
    Sku,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    /// Request-facing name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Price => "price",
            SortField::Name => "name",
            SortField::Sku => "sku",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

impl FromStr for SortField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price" => Ok(SortField::Price),
            "name" => Ok(SortField::Name),
            "sku" => Ok(SortField::Sku),
            "created_at" => Ok(SortField::CreatedAt),
            "updated_at" => Ok(SortField::UpdatedAt),
            other => Err(ValidationError::InvalidValue {
                field: "sort".to_string(),
                reason: format!(
                    "'{}' is not sortable; use price, name, sku, created_at or updated_at",
                    other
                ),
            }),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl FromStr for SortOrder {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(ValidationError::InvalidValue {
                field: "order".to_string(),
                reason: format!("'{}' is not one of: asc, desc", other),
            }),
        }
    }
}

// ============================================================================
// REQUEST
// ============================================================================

/// Filter set of a search. Every field is optional and independent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchFilters {
    pub q: Option<String>,
    pub category: Option<String>,
    pub status: Option<RecordStatus>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sort: Option<SortField>,
    #[serde(default)]
    pub order: SortOrder,
}

impl SearchFilters {
    /// Trim text filters and drop the ones left empty.
    pub fn normalized(mut self) -> Self {
        self.q = non_blank(self.q);
        self.category = non_blank(self.category);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [("min_price", self.min_price), ("max_price", self.max_price)] {
            if let Some(bound) = value {
                if !bound.is_finite() || bound < 0.0 {
                    return Err(ValidationError::InvalidValue {
                        field: field.to_string(),
                        reason: "must be a non-negative number".to_string(),
                    });
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(ValidationError::ConstraintViolation {
                    constraint: "price_range".to_string(),
                    reason: format!("min_price {} is greater than max_price {}", min, max),
                });
            }
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A filter set plus pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchRequest {
    #[serde(flatten)]
    pub filters: SearchFilters,
    pub page: u32,
    pub per_page: u32,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            filters: SearchFilters::default(),
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl SearchRequest {
    pub fn new(filters: SearchFilters) -> Self {
        Self {
            filters: filters.normalized(),
            ..Default::default()
        }
    }

    pub fn with_page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page < 1 {
            return Err(ValidationError::InvalidValue {
                field: "page".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.per_page < 1 || self.per_page > MAX_PER_PAGE {
            return Err(ValidationError::InvalidValue {
                field: "per_page".to_string(),
                reason: format!("must be between 1 and {}", MAX_PER_PAGE),
            });
        }
        if self.offset() + u64::from(self.per_page) > MAX_RESULT_WINDOW {
            return Err(ValidationError::InvalidValue {
                field: "page".to_string(),
                reason: format!(
                    "page {} of size {} reaches past the first {} results",
                    self.page, self.per_page, MAX_RESULT_WINDOW
                ),
            });
        }
        self.filters.validate()
    }

    /// Zero-based offset of the first hit on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    /// Stable serialization of every present parameter, independent of the
    /// order in which the caller supplied them. Two requests that would
    /// produce the same result page share the same canonical form.
    pub fn canonical_form(&self) -> String {
        let mut params: BTreeMap<&'static str, String> = BTreeMap::new();
        let filters = &self.filters;
        if let Some(q) = &filters.q {
            params.insert("q", q.clone());
        }
        if let Some(category) = &filters.category {
            params.insert("category", category.clone());
        }
        if let Some(status) = filters.status {
            params.insert("status", status.as_str().to_string());
        }
        if let Some(min) = filters.min_price {
            params.insert("min_price", min.to_string());
        }
        if let Some(max) = filters.max_price {
            params.insert("max_price", max.to_string());
        }
        if let Some(sort) = filters.sort {
            params.insert("sort", sort.as_str().to_string());
            params.insert("order", filters.order.as_str().to_string());
        }
        params.insert("page", self.page.to_string());
        params.insert("per_page", self.per_page.to_string());

        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, escape_param(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn escape_param(value: &str) -> String {
    value.replace('%', "%25").replace('&', "%26").replace('=', "%3D")
}

// ============================================================================
// RESULT
// ============================================================================

/// One hit of a result page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchHit {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub document: IndexDocument,
}

/// A page of search results: total matches plus the ordered hits of the page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchPage {
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

impl SearchPage {
    /// The "nothing indexed yet" page.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.hits.iter().map(|hit| hit.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request = SearchRequest::default();
        assert_eq!(request.page, 1);
        assert_eq!(request.per_page, 15);
        assert_eq!(request.offset(), 0);
        assert_eq!(request.filters.order, SortOrder::Asc);
    }

    #[test]
    fn test_offset() {
        let request = SearchRequest::default().with_page(3, 10);
        assert_eq!(request.offset(), 20);
    }

    #[test]
    fn test_normalization_drops_blank_text() {
        let request = SearchRequest::new(SearchFilters {
            q: Some("   ".to_string()),
            category: Some(" tools ".to_string()),
            ..Default::default()
        });
        assert_eq!(request.filters.q, None);
        assert_eq!(request.filters.category.as_deref(), Some("tools"));
    }

    #[test]
    fn test_validation() {
        assert!(SearchRequest::default().with_page(0, 10).validate().is_err());
        assert!(SearchRequest::default().with_page(1, 0).validate().is_err());
        assert!(SearchRequest::default().with_page(1, 101).validate().is_err());

        // The last page inside the result window is fine, the next is not.
        assert!(SearchRequest::default().with_page(100, 100).validate().is_ok());
        assert!(matches!(
            SearchRequest::default().with_page(101, 100).validate(),
            Err(ValidationError::InvalidValue { field, .. }) if field == "page"
        ));
        assert!(SearchRequest::default().with_page(u32::MAX, 100).validate().is_err());

        let inverted = SearchRequest::new(SearchFilters {
            min_price: Some(20.0),
            max_price: Some(5.0),
            ..Default::default()
        });
        assert!(matches!(
            inverted.validate(),
            Err(ValidationError::ConstraintViolation { .. })
        ));

        let negative = SearchRequest::new(SearchFilters {
            min_price: Some(-1.0),
            ..Default::default()
        });
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_canonical_form_is_sorted_and_complete() {
        let request = SearchRequest::new(SearchFilters {
            q: Some("widget".to_string()),
            category: Some("tools".to_string()),
            min_price: Some(5.0),
            sort: Some(SortField::Price),
            ..Default::default()
        });
        assert_eq!(
            request.canonical_form(),
            "category=tools&min_price=5&order=asc&page=1&per_page=15&q=widget&sort=price"
        );
    }

    #[test]
    fn test_canonical_form_ignores_order_without_sort() {
        let asc = SearchRequest::new(SearchFilters::default());
        let desc = SearchRequest::new(SearchFilters {
            order: SortOrder::Desc,
            ..Default::default()
        });
        assert_eq!(asc.canonical_form(), desc.canonical_form());
    }

    #[test]
    fn test_canonical_form_escapes_separators() {
        let tricky = SearchRequest::new(SearchFilters {
            q: Some("a&page=9".to_string()),
            ..Default::default()
        });
        assert!(tricky.canonical_form().contains("q=a%26page%3D9"));
    }

    #[test]
    fn test_sort_parsing() {
        assert_eq!("price".parse::<SortField>(), Ok(SortField::Price));
        assert!("description".parse::<SortField>().is_err());
        assert_eq!("DESC".parse::<SortOrder>(), Ok(SortOrder::Desc));
    }
}
