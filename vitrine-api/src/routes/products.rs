//! Product REST API Routes
//!
//! CRUD over catalog records. Every mutation publishes its lifecycle event;
//! when a handler fails the response carries the
//! `x-vitrine-propagation-warning` header and the mutation stands.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use vitrine_core::RecordId;

use crate::constants::PROPAGATION_WARNING_HEADER;
use crate::error::{ApiError, ApiResult};
use crate::services::{CatalogService, Mutation};
use crate::state::AppState;
use crate::types::{ListQuery, ProductPayload};

#[cfg(feature = "openapi")]
use vitrine_core::CatalogRecord;
#[cfg(feature = "openapi")]
use vitrine_storage::RecordPage;

pub(crate) fn parse_id(raw: &str) -> ApiResult<RecordId> {
    raw.parse::<RecordId>().map_err(ApiError::from)
}

fn parse_payload(payload: Result<Json<ProductPayload>, JsonRejection>) -> ApiResult<ProductPayload> {
    payload
        .map(|Json(p)| p)
        .map_err(|e| ApiError::invalid_input(e.body_text()))
}

/// Header values must be visible ASCII.
fn header_safe(warning: &str) -> String {
    warning
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { ' ' })
        .collect()
}

fn mutation_response<T: Serialize>(status: StatusCode, mutation: Mutation<T>, body: bool) -> Response {
    let mut response = if body {
        (status, Json(mutation.value)).into_response()
    } else {
        status.into_response()
    };
    if let Some(value) = mutation
        .warning
        .and_then(|w| HeaderValue::from_str(&header_safe(&w)).ok())
    {
        response.headers_mut().insert(PROPAGATION_WARNING_HEADER, value);
    }
    response
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/products - Paginated listing of live records
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/products",
    tag = "Products",
    params(ListQuery),
    responses(
        (status = 200, description = "Page of live records", body = RecordPage),
        (status = 400, description = "Malformed query string", body = ApiError),
    ),
))]
pub async fn list_products(
    State(catalog): State<CatalogService>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    let (page, per_page) = query.resolve();
    let records = catalog.list(page, per_page).await?;
    Ok(Json(records))
}

/// POST /api/products - Create a record
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/products",
    tag = "Products",
    request_body = ProductPayload,
    responses(
        (status = 201, description = "Record created", body = CatalogRecord),
        (status = 400, description = "Invalid payload", body = ApiError),
        (status = 409, description = "SKU already in use", body = ApiError),
    ),
))]
pub async fn create_product(
    State(catalog): State<CatalogService>,
    payload: Result<Json<ProductPayload>, JsonRejection>,
) -> ApiResult<Response> {
    let record = parse_payload(payload)?.into_new_record()?;
    let mutation = catalog.create(record).await?;
    Ok(mutation_response(StatusCode::CREATED, mutation, true))
}

/// GET /api/products/{id} - Cached single read, soft-deleted records included
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/products/{id}",
    tag = "Products",
    params(("id" = i64, Path, description = "Record ID")),
    responses(
        (status = 200, description = "Record found", body = CatalogRecord),
        (status = 404, description = "Record not found", body = ApiError),
    ),
))]
pub async fn get_product(
    State(catalog): State<CatalogService>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let record = catalog
        .get(id)
        .await?
        .ok_or_else(|| ApiError::entity_not_found("Product", id))?;
    Ok(Json(record))
}

/// PUT /api/products/{id} - Full update
#[cfg_attr(feature = "openapi", utoipa::path(
    put,
    path = "/api/products/{id}",
    tag = "Products",
    params(("id" = i64, Path, description = "Record ID")),
    request_body = ProductPayload,
    responses(
        (status = 200, description = "Record updated", body = CatalogRecord),
        (status = 400, description = "Invalid payload", body = ApiError),
        (status = 404, description = "Record not found", body = ApiError),
        (status = 409, description = "SKU already in use", body = ApiError),
    ),
))]
pub async fn update_product(
    State(catalog): State<CatalogService>,
    Path(id): Path<String>,
    payload: Result<Json<ProductPayload>, JsonRejection>,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let patch = parse_payload(payload)?.into_replacement()?;
    let mutation = catalog.update(id, patch).await?;
    Ok(mutation_response(StatusCode::OK, mutation, true))
}

/// DELETE /api/products/{id} - Soft delete
#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/api/products/{id}",
    tag = "Products",
    params(("id" = i64, Path, description = "Record ID")),
    responses(
        (status = 204, description = "Record soft-deleted"),
        (status = 404, description = "Record not found or already deleted", body = ApiError),
    ),
))]
pub async fn delete_product(
    State(catalog): State<CatalogService>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let mutation = catalog.soft_delete(id).await?;
    Ok(mutation_response(StatusCode::NO_CONTENT, mutation, false))
}

/// POST /api/products/{id}/restore - Restore a soft-deleted record
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/products/{id}/restore",
    tag = "Products",
    params(("id" = i64, Path, description = "Record ID")),
    responses(
        (status = 200, description = "Record restored", body = CatalogRecord),
        (status = 404, description = "Record not found", body = ApiError),
        (status = 409, description = "Record is not deleted", body = ApiError),
    ),
))]
pub async fn restore_product(
    State(catalog): State<CatalogService>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let mutation = catalog.restore(id).await?;
    Ok(mutation_response(StatusCode::OK, mutation, true))
}

/// DELETE /api/products/{id}/force - Permanent delete
#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/api/products/{id}/force",
    tag = "Products",
    params(("id" = i64, Path, description = "Record ID")),
    responses(
        (status = 204, description = "Record permanently deleted"),
        (status = 404, description = "Record not found", body = ApiError),
    ),
))]
pub async fn force_delete_product(
    State(catalog): State<CatalogService>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = parse_id(&id)?;
    let mutation = catalog.hard_delete(id).await?;
    Ok(mutation_response(StatusCode::NO_CONTENT, mutation, false))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route("/:id/restore", post(restore_product))
        .route("/:id/force", delete(force_delete_product))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").ok(), Some(RecordId::new(42)));
        assert!(parse_id("0").is_err());
        assert!(parse_id("abc").is_err());
    }

    #[test]
    fn test_warning_header_attached() {
        let mutation = Mutation {
            value: RecordId::new(1),
            warning: Some("hard_deleted(1) not fully propagated:\nchange_notifier: closed".to_string()),
        };
        let response = mutation_response(StatusCode::NO_CONTENT, mutation, false);
        let header = response
            .headers()
            .get(PROPAGATION_WARNING_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(header.contains("change_notifier"));
        assert!(!header.contains('\n'));
    }

    #[test]
    fn test_clean_mutation_has_no_header() {
        let mutation = Mutation {
            value: RecordId::new(1),
            warning: None,
        };
        let response = mutation_response(StatusCode::NO_CONTENT, mutation, false);
        assert!(response.headers().get(PROPAGATION_WARNING_HEADER).is_none());
    }
}
