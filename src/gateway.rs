use serde::Deserialize;

use crate::error::{AppError, AppResult};

/// Thin Mercado Pago client. Single attempt per call, no retries; callers
/// surface failures as `ExternalService`.
#[derive(Clone)]
pub struct MercadoPago {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct Preference {
    pub id: String,
    pub init_point: String,
}

#[derive(Debug, Deserialize)]
pub struct GatewayPayment {
    pub id: i64,
    pub status: String,
    pub external_reference: Option<String>,
    pub transaction_amount: Option<f64>,
}

impl MercadoPago {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            access_token: access_token.into(),
        }
    }

    /// Create a checkout preference for a plan. Price and currency decisions
    /// are delegated to the gateway; we only pass them through.
    pub async fn create_preference(
        &self,
        title: &str,
        unit_price_minor: i64,
        currency: &str,
        external_reference: &str,
    ) -> AppResult<Preference> {
        let body = serde_json::json!({
            "items": [{
                "title": title,
                "quantity": 1,
                "unit_price": unit_price_minor as f64 / 100.0,
                "currency_id": currency,
            }],
            "external_reference": external_reference,
        });

        let response = self
            .http
            .post(format!("{}/checkout/preferences", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::ExternalService(format!("preference request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "preference request returned {}",
                response.status()
            )));
        }

        response
            .json::<Preference>()
            .await
            .map_err(|err| AppError::ExternalService(format!("preference response invalid: {err}")))
    }

    /// Fetch a payment by gateway id, used by the webhook handler.
    pub async fn get_payment(&self, payment_id: &str) -> AppResult<GatewayPayment> {
        let response = self
            .http
            .get(format!("{}/v1/payments/{payment_id}", self.base_url))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| AppError::ExternalService(format!("payment lookup failed: {err}")))?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "payment lookup returned {}",
                response.status()
            )));
        }

        response
            .json::<GatewayPayment>()
            .await
            .map_err(|err| AppError::ExternalService(format!("payment response invalid: {err}")))
    }
}
