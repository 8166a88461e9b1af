use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Plan, PlanPayment};

#[derive(Debug, Serialize, ToSchema)]
pub struct PlanList {
    pub items: Vec<Plan>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentSubscription {
    pub plan: Option<Plan>,
    pub plan_status: String,
    pub payments: Vec<PlanPayment>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubscribeRequest {
    pub plan_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub preference_id: String,
    pub init_point: String,
}

/// Mercado Pago webhook notification body (the fields we act on).
#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookNotification {
    #[serde(rename = "type", alias = "topic")]
    pub kind: Option<String>,
    pub data: Option<WebhookData>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookData {
    pub id: serde_json::Value,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookQuery {
    pub secret: Option<String>,
}
