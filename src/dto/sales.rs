use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{ManualProduct, Sale, SaleItem};

/// One cart line: either a catalog reference or a manual free-text entry
/// already resolved to name/quantity/price by the operator.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SaleItemInput {
    pub product_id: Option<Uuid>,
    pub name: Option<String>,
    pub quantity: i32,
    pub unit_price: Option<i64>,
    #[serde(default)]
    pub manual: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DiscountInput {
    #[serde(rename = "type")]
    pub discount_type: DiscountType,
    /// Basis points for PERCENTAGE, minor currency units for FIXED.
    pub value: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSaleRequest {
    pub items: Vec<SaleItemInput>,
    pub payment_method: String,
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub is_credit: bool,
    pub discount: Option<DiscountInput>,
    pub tax_rate_bps: Option<i32>,
    /// Client-computed total, verified against the server-side computation
    /// and rejected on mismatch. Never trusted as the authoritative amount.
    pub total: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SaleWithItems {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SaleList {
    pub items: Vec<Sale>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ParseManualRequest {
    pub text: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LinkManualRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ManualProductList {
    pub items: Vec<ManualProduct>,
}
