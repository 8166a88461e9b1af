use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod customers;
pub mod doc;
pub mod health;
pub mod imports;
pub mod params;
pub mod products;
pub mod sales;
pub mod subscription;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/products", products::router())
        .nest("/sales", sales::router())
        .nest("/customers", customers::router())
        .nest("/imports", imports::router())
        .nest("/subscription", subscription::router())
        .nest("/admin", admin::router())
}
