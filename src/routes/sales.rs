use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::sales::{
        CreateSaleRequest, LinkManualRequest, ManualProductList, ParseManualRequest, SaleList,
        SaleWithItems,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::ManualProduct,
    response::ApiResponse,
    routes::params::{ManualProductQuery, SaleListQuery},
    services::{manual_product_service, sale_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_sale))
        .route("/", get(list_sales))
        .route("/manual-products", get(list_manual_products))
        .route("/manual-products/parse", post(parse_manual_product))
        .route("/manual-products/{id}/link", post(link_manual_product))
        .route("/manual-products/{id}/convert", post(convert_manual_product))
        .route("/manual-products/{id}/ignore", post(ignore_manual_product))
        .route("/{id}", get(get_sale))
        .route("/{id}/cancel", post(cancel_sale))
}

#[utoipa::path(
    post,
    path = "/api/sales",
    request_body = CreateSaleRequest,
    responses(
        (status = 200, description = "Sale created", body = ApiResponse<SaleWithItems>),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Insufficient stock"),
    ),
    security(("bearer_auth" = [])),
    tag = "Sales"
)]
pub async fn create_sale(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateSaleRequest>,
) -> AppResult<Json<ApiResponse<SaleWithItems>>> {
    let resp = sale_service::create_sale(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/sales",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
    ),
    responses(
        (status = 200, description = "List sales", body = ApiResponse<SaleList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Sales"
)]
pub async fn list_sales(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SaleListQuery>,
) -> AppResult<Json<ApiResponse<SaleList>>> {
    let resp = sale_service::list_sales(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/sales/{id}",
    params(
        ("id" = Uuid, Path, description = "Sale ID")
    ),
    responses(
        (status = 200, description = "Get sale with items", body = ApiResponse<SaleWithItems>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Sales"
)]
pub async fn get_sale(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SaleWithItems>>> {
    let resp = sale_service::get_sale(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/sales/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Sale ID")
    ),
    responses(
        (status = 200, description = "Sale cancelled, stock restored", body = ApiResponse<SaleWithItems>),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Sale already cancelled"),
    ),
    security(("bearer_auth" = [])),
    tag = "Sales"
)]
pub async fn cancel_sale(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SaleWithItems>>> {
    let resp = sale_service::cancel_sale(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/sales/manual-products/parse",
    request_body = ParseManualRequest,
    responses(
        (status = 200, description = "Manual product staged", body = ApiResponse<ManualProduct>),
        (status = 422, description = "Unparsable text"),
    ),
    security(("bearer_auth" = [])),
    tag = "Sales"
)]
pub async fn parse_manual_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ParseManualRequest>,
) -> AppResult<Json<ApiResponse<ManualProduct>>> {
    let resp = manual_product_service::parse_and_stage(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/sales/manual-products",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
    ),
    responses(
        (status = 200, description = "List manual products", body = ApiResponse<ManualProductList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Sales"
)]
pub async fn list_manual_products(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ManualProductQuery>,
) -> AppResult<Json<ApiResponse<ManualProductList>>> {
    let resp = manual_product_service::list_manual_products(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/sales/manual-products/{id}/link",
    params(
        ("id" = Uuid, Path, description = "Manual product ID")
    ),
    request_body = LinkManualRequest,
    responses(
        (status = 200, description = "Linked to catalog product", body = ApiResponse<ManualProduct>),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Not in PENDING state"),
    ),
    security(("bearer_auth" = [])),
    tag = "Sales"
)]
pub async fn link_manual_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<LinkManualRequest>,
) -> AppResult<Json<ApiResponse<ManualProduct>>> {
    let resp = manual_product_service::link_manual_product(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/sales/manual-products/{id}/convert",
    params(
        ("id" = Uuid, Path, description = "Manual product ID")
    ),
    responses(
        (status = 200, description = "Converted into a catalog product", body = ApiResponse<ManualProduct>),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Not in PENDING state"),
    ),
    security(("bearer_auth" = [])),
    tag = "Sales"
)]
pub async fn convert_manual_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ManualProduct>>> {
    let resp = manual_product_service::convert_manual_product(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/sales/manual-products/{id}/ignore",
    params(
        ("id" = Uuid, Path, description = "Manual product ID")
    ),
    responses(
        (status = 200, description = "Discarded", body = ApiResponse<ManualProduct>),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Not in PENDING state"),
    ),
    security(("bearer_auth" = [])),
    tag = "Sales"
)]
pub async fn ignore_manual_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ManualProduct>>> {
    let resp = manual_product_service::ignore_manual_product(&state, &user, id).await?;
    Ok(Json(resp))
}
