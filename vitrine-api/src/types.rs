//! Request and response types for the REST API.
//!
//! Request bodies and query strings arrive loosely typed; the conversions
//! here apply the field rules and produce the core record and search types.

use serde::{Deserialize, Serialize};
use vitrine_core::{
    NewRecord, Price, RecordPatch, RecordStatus, SearchFilters, SearchRequest,
    SortField, SortOrder, ValidationError, DEFAULT_PAGE, DEFAULT_PER_PAGE, MAX_PER_PAGE,
};
use vitrine_sync::{ParkedTask, QueueDepth, SyncMetricsSnapshot};

use crate::constants::*;

// ============================================================================
// PRODUCT PAYLOAD
// ============================================================================

/// Body of `POST /api/products` and `PUT /api/products/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProductPayload {
    pub sku: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    /// `active` (default) or `inactive`
    pub status: Option<String>,
    pub image_path: Option<String>,
}

fn required(field: &str, value: Option<String>) -> Result<String, ValidationError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        })
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min || len > max {
        let reason = if min > 1 {
            format!("must be between {} and {} characters", min, max)
        } else {
            format!("must be at most {} characters", max)
        };
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            reason,
        });
    }
    Ok(())
}

impl ProductPayload {
    /// Validate the payload into a complete record.
    pub fn into_new_record(self) -> Result<NewRecord, ValidationError> {
        let sku = required("sku", self.sku)?;
        check_len("sku", &sku, 1, MAX_SKU_LEN)?;

        let name = required("name", self.name)?;
        check_len("name", &name, MIN_NAME_LEN, MAX_NAME_LEN)?;

        let price = self
            .price
            .ok_or_else(|| ValidationError::RequiredFieldMissing {
                field: "price".to_string(),
            })
            .and_then(Price::try_from)?;

        let category = required("category", self.category)?;
        check_len("category", &category, 1, MAX_CATEGORY_LEN)?;

        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => RecordStatus::default(),
            Some(s) => s.parse()?,
        };

        Ok(NewRecord {
            sku,
            name,
            description: self.description.filter(|d| !d.trim().is_empty()),
            price,
            category,
            status,
            image_path: self.image_path.filter(|p| !p.trim().is_empty()),
        })
    }

    /// Validate the payload as a full replacement. An absent `image_path`
    /// leaves the stored image untouched.
    pub fn into_replacement(self) -> Result<RecordPatch, ValidationError> {
        let keep_image = self.image_path.is_none();
        let mut patch = RecordPatch::from(self.into_new_record()?);
        if keep_image {
            patch.image_path = None;
        }
        Ok(patch)
    }
}

// ============================================================================
// QUERY STRINGS
// ============================================================================

/// Pagination of `GET /api/products`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(
    feature = "openapi",
    derive(utoipa::IntoParams),
    into_params(parameter_in = Query)
)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListQuery {
    /// `(page, per_page)` with defaults applied and the page size capped.
    pub fn resolve(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(DEFAULT_PAGE).max(1);
        let per_page = self
            .per_page
            .unwrap_or(DEFAULT_LIST_PER_PAGE)
            .clamp(1, MAX_LIST_PER_PAGE);
        (page, per_page)
    }
}

/// Query string of `GET /api/search/products`.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(
    feature = "openapi",
    derive(utoipa::IntoParams),
    into_params(parameter_in = Query)
)]
pub struct SearchQuery {
    /// Free text matched against name and description
    pub q: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// One of price, name, sku, created_at, updated_at
    pub sort: Option<String>,
    /// asc (default) or desc
    pub order: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

fn parse_opt<T>(value: Option<&str>) -> Result<Option<T>, ValidationError>
where
    T: std::str::FromStr<Err = ValidationError>,
{
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v.parse().map(Some),
    }
}

impl SearchQuery {
    pub fn into_request(self) -> Result<SearchRequest, ValidationError> {
        let status = parse_opt::<RecordStatus>(self.status.as_deref())?;
        let sort = parse_opt::<SortField>(self.sort.as_deref())?;
        let order = parse_opt::<SortOrder>(self.order.as_deref())?.unwrap_or_default();

        let filters = SearchFilters {
            q: self.q,
            category: self.category,
            status,
            min_price: self.min_price,
            max_price: self.max_price,
            sort,
            order,
        };
        let page = self.page.unwrap_or(DEFAULT_PAGE);
        let per_page = self.per_page.unwrap_or(DEFAULT_PER_PAGE).min(MAX_PER_PAGE);

        let request = SearchRequest::new(filters).with_page(page, per_page);
        request.validate()?;
        Ok(request)
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

/// Outcome of an index administration call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct IndexActionResponse {
    pub index: String,
    /// `created`, `deleted` or `absent`
    pub result: String,
}

/// Body of `GET /api/sync/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SyncStatusResponse {
    pub depth: QueueDepth,
    pub parked: Vec<ParkedTask>,
    pub metrics: SyncMetricsSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RequeueResponse {
    pub requeued: usize,
}
