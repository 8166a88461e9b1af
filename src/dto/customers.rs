use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{AccountEntry, Customer};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub credit_limit: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub credit_limit: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordPaymentRequest {
    pub amount: i64,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerList {
    pub items: Vec<Customer>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerAccount {
    pub customer: Customer,
    pub entries: Vec<AccountEntry>,
}
