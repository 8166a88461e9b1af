use crate::db::{DbPool, OrmConn};
use crate::gateway::MercadoPago;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub gateway: MercadoPago,
    pub jwt_secret: String,
    pub mp_webhook_secret: Option<String>,
}
