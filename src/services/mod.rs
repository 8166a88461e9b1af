pub mod admin_service;
pub mod billing_service;
pub mod customer_service;
pub mod import_service;
pub mod manual_product_service;
pub mod product_service;
pub mod sale_service;
