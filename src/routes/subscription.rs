use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};

use crate::{
    dto::billing::{
        CheckoutResponse, CurrentSubscription, PlanList, SubscribeRequest, WebhookNotification,
        WebhookQuery,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::billing_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/plans", get(list_plans))
        .route("/current", get(current_subscription))
        .route("/checkout", post(subscription_checkout))
        .route("/mercadopago/webhook", post(mercadopago_webhook))
}

#[utoipa::path(
    get,
    path = "/api/subscription/plans",
    responses(
        (status = 200, description = "Active plans", body = ApiResponse<PlanList>)
    ),
    tag = "Subscription"
)]
pub async fn list_plans(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<PlanList>>> {
    let resp = billing_service::list_plans(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/subscription/current",
    responses(
        (status = 200, description = "Current plan and payment history", body = ApiResponse<CurrentSubscription>)
    ),
    security(("bearer_auth" = [])),
    tag = "Subscription"
)]
pub async fn current_subscription(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CurrentSubscription>>> {
    let resp = billing_service::current_subscription(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/subscription/checkout",
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Gateway preference created", body = ApiResponse<CheckoutResponse>),
        (status = 404, description = "Plan not found"),
        (status = 502, description = "Gateway failure"),
    ),
    security(("bearer_auth" = [])),
    tag = "Subscription"
)]
pub async fn subscription_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<SubscribeRequest>,
) -> AppResult<Json<ApiResponse<CheckoutResponse>>> {
    let resp = billing_service::subscription_checkout(&state, &user, payload).await?;
    Ok(Json(resp))
}

// Unauthenticated: called by the gateway, not by users. Signature
// verification is the gateway integration's concern; a shared secret query
// parameter is checked when configured.
#[utoipa::path(
    post,
    path = "/api/subscription/mercadopago/webhook",
    request_body = WebhookNotification,
    responses(
        (status = 200, description = "Notification applied (idempotent under redelivery)"),
        (status = 403, description = "Bad shared secret"),
        (status = 502, description = "Gateway lookup failed"),
    ),
    tag = "Subscription"
)]
pub async fn mercadopago_webhook(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    Json(payload): Json<WebhookNotification>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = billing_service::handle_webhook(&state, query.secret.as_deref(), payload).await?;
    Ok(Json(resp))
}
