//! Search REST API Routes
//!
//! Cached product search and administration of the search index.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::error::{ApiError, ApiResult};
use crate::services::{CatalogService, IndexService};
use crate::state::AppState;
use crate::types::{IndexActionResponse, SearchQuery};

#[cfg(feature = "openapi")]
use vitrine_core::SearchPage;

/// GET /api/search/products - Filtered, sorted, paginated search
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/search/products",
    tag = "Search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching documents", body = SearchPage),
        (status = 400, description = "Invalid search parameters", body = ApiError),
        (status = 503, description = "Search engine unavailable", body = ApiError),
        (status = 504, description = "Search timed out", body = ApiError),
    ),
))]
pub async fn search_products(
    State(catalog): State<CatalogService>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    let request = query.into_request()?;
    let page = catalog.search(&request).await?;
    Ok(Json(page))
}

/// POST /api/search/products/index - Create the search index
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/search/products/index",
    tag = "Search",
    responses(
        (status = 201, description = "Index created", body = IndexActionResponse),
        (status = 409, description = "Index already exists", body = ApiError),
    ),
))]
pub async fn create_index(State(index): State<IndexService>) -> ApiResult<impl IntoResponse> {
    index.create().await?;
    let body = IndexActionResponse {
        index: index.index_name().to_string(),
        result: "created".to_string(),
    };
    Ok((StatusCode::CREATED, Json(body)))
}

/// DELETE /api/search/products/index - Delete the search index (idempotent)
#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/api/search/products/index",
    tag = "Search",
    responses(
        (status = 200, description = "Index deleted or already absent", body = IndexActionResponse),
    ),
))]
pub async fn delete_index(State(index): State<IndexService>) -> ApiResult<impl IntoResponse> {
    let existed = index.delete().await?;
    let body = IndexActionResponse {
        index: index.index_name().to_string(),
        result: if existed { "deleted" } else { "absent" }.to_string(),
    };
    Ok(Json(body))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/products", get(search_products))
        .route("/products/index", post(create_index).delete(delete_index))
}
