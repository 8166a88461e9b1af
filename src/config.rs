use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub mp_access_token: String,
    pub mp_base_url: String,
    pub mp_webhook_secret: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let jwt_secret = env::var("JWT_SECRET")?;
        let mp_access_token = env::var("MP_ACCESS_TOKEN").unwrap_or_default();
        let mp_base_url =
            env::var("MP_BASE_URL").unwrap_or_else(|_| "https://api.mercadopago.com".to_string());
        let mp_webhook_secret = env::var("MP_WEBHOOK_SECRET").ok();
        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            mp_access_token,
            mp_base_url,
            mp_webhook_secret,
        })
    }
}
