use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::products::ProductList,
    dto::sales::{SaleList, SaleWithItems},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::{Pagination, SaleListQuery},
    services::admin_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sales", get(list_all_sales))
        .route("/sales/{id}", get(get_sale_admin))
        .route("/inventory/low-stock", get(list_low_stock))
        .route("/reports/sales-summary", get(sales_summary))
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub threshold: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct SalesSummaryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct SalesSummary {
    pub count: i64,
    pub revenue: i64,
}

#[utoipa::path(
    get,
    path = "/api/admin/sales",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
    ),
    responses(
        (status = 200, description = "List all sales for the business", body = ApiResponse<SaleList>),
        (status = 403, description = "Admin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_all_sales(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SaleListQuery>,
) -> AppResult<Json<ApiResponse<SaleList>>> {
    let resp = admin_service::list_all_sales(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/sales/{id}",
    params(
        ("id" = Uuid, Path, description = "Sale ID")
    ),
    responses(
        (status = 200, description = "Sale with items", body = ApiResponse<SaleWithItems>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn get_sale_admin(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SaleWithItems>>> {
    let resp = admin_service::get_sale_admin(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/inventory/low-stock",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("threshold" = Option<i32>, Query, description = "Fixed stock threshold, overrides per-product min_stock"),
    ),
    responses(
        (status = 200, description = "Products at or below reorder point", body = ApiResponse<ProductList>),
        (status = 403, description = "Admin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_low_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<LowStockQuery>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let resp = admin_service::list_low_stock(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/reports/sales-summary",
    params(
        ("from" = Option<String>, Query, description = "Inclusive start, RFC 3339"),
        ("to" = Option<String>, Query, description = "Inclusive end, RFC 3339"),
    ),
    responses(
        (status = 200, description = "Completed-sale count and revenue", body = ApiResponse<SalesSummary>),
        (status = 403, description = "Admin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn sales_summary(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SalesSummaryQuery>,
) -> AppResult<Json<ApiResponse<SalesSummary>>> {
    let resp = admin_service::sales_summary(&state, &user, query).await?;
    Ok(Json(resp))
}
