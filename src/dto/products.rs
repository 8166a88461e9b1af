use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Product;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub sku: Option<String>,
    pub stock: i32,
    pub min_stock: Option<i32>,
    pub cost_price: i64,
    pub sale_price: i64,
    pub category: Option<String>,
    pub supplier: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub min_stock: Option<i32>,
    pub cost_price: Option<i64>,
    pub sale_price: Option<i64>,
    pub state: Option<String>,
    pub category: Option<String>,
    pub supplier: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustStockRequest {
    pub delta: i32,
}

#[derive(Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}
