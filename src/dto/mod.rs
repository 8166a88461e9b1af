pub mod billing;
pub mod customers;
pub mod imports;
pub mod products;
pub mod sales;
