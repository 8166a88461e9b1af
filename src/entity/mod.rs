pub mod account_entries;
pub mod audit_logs;
pub mod businesses;
pub mod customers;
pub mod manual_products;
pub mod plan_payments;
pub mod plans;
pub mod products;
pub mod sale_items;
pub mod sales;
pub mod users;
