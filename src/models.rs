use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub sku: Option<String>,
    pub stock: i32,
    pub min_stock: i32,
    pub reserved_stock: i32,
    pub cost_price: i64,
    pub sale_price: i64,
    pub state: String,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Sale {
    pub id: Uuid,
    pub business_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub status: String,
    pub payment_method: String,
    pub is_credit: bool,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub tax_amount: i64,
    pub total: i64,
    pub tax_rate_bps: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SaleItem {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub product_id: Option<Uuid>,
    pub name: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub is_manual: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ManualProduct {
    pub id: Uuid,
    pub business_id: Uuid,
    pub original_text: String,
    pub name: String,
    pub quantity: i32,
    pub price: i64,
    pub status: String,
    pub linked_product_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Customer {
    pub id: Uuid,
    pub business_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub credit_limit: i64,
    pub balance: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccountEntry {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub sale_id: Option<Uuid>,
    pub kind: String,
    pub amount: i64,
    pub balance_after: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub currency: String,
    pub features: serde_json::Value,
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlanPayment {
    pub id: Uuid,
    pub business_id: Uuid,
    pub plan_id: Uuid,
    pub gateway_payment_id: String,
    pub status: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}
