use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::customers::{
        CreateCustomerRequest, CustomerAccount, CustomerList, RecordPaymentRequest,
        UpdateCustomerRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Customer,
    response::ApiResponse,
    routes::params::Pagination,
    services::customer_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_customer))
        .route("/", get(list_customers))
        .route("/{id}", get(get_customer))
        .route("/{id}", put(update_customer))
        .route("/{id}", delete(delete_customer))
        .route("/{id}/account", get(get_account))
        .route("/{id}/payments", post(record_payment))
}

#[utoipa::path(
    get,
    path = "/api/customers",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
    ),
    responses(
        (status = 200, description = "List customers", body = ApiResponse<CustomerList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
pub async fn list_customers(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<CustomerList>>> {
    let resp = customer_service::list_customers(&state, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/customers/{id}",
    params(
        ("id" = Uuid, Path, description = "Customer ID")
    ),
    responses(
        (status = 200, description = "Get customer", body = ApiResponse<Customer>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
pub async fn get_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Customer>>> {
    let resp = customer_service::get_customer(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/customers",
    request_body = CreateCustomerRequest,
    responses(
        (status = 200, description = "Customer created", body = ApiResponse<Customer>),
        (status = 400, description = "Validation error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
pub async fn create_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateCustomerRequest>,
) -> AppResult<Json<ApiResponse<Customer>>> {
    let resp = customer_service::create_customer(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/customers/{id}",
    params(
        ("id" = Uuid, Path, description = "Customer ID")
    ),
    request_body = UpdateCustomerRequest,
    responses(
        (status = 200, description = "Updated customer", body = ApiResponse<Customer>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
pub async fn update_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCustomerRequest>,
) -> AppResult<Json<ApiResponse<Customer>>> {
    let resp = customer_service::update_customer(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/customers/{id}",
    params(
        ("id" = Uuid, Path, description = "Customer ID")
    ),
    responses(
        (status = 200, description = "Deleted customer"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Outstanding balance"),
    ),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
pub async fn delete_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = customer_service::delete_customer(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/customers/{id}/account",
    params(
        ("id" = Uuid, Path, description = "Customer ID")
    ),
    responses(
        (status = 200, description = "Balance and entry history", body = ApiResponse<CustomerAccount>),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
pub async fn get_account(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CustomerAccount>>> {
    let resp = customer_service::get_account(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/customers/{id}/payments",
    params(
        ("id" = Uuid, Path, description = "Customer ID")
    ),
    request_body = RecordPaymentRequest,
    responses(
        (status = 200, description = "Payment recorded", body = ApiResponse<CustomerAccount>),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Customers"
)]
pub async fn record_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordPaymentRequest>,
) -> AppResult<Json<ApiResponse<CustomerAccount>>> {
    let resp = customer_service::record_payment(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
