use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::{
    dto::billing::{
        CheckoutResponse, CurrentSubscription, PlanList, SubscribeRequest, WebhookNotification,
    },
    entity::{
        businesses::{ActiveModel as BusinessActive, Entity as Businesses},
        plan_payments::{
            ActiveModel as PaymentActive, Column as PaymentCol, Entity as PlanPayments,
            Model as PaymentModel,
        },
        plans::{Column as PlanCol, Entity as Plans, Model as PlanModel},
    },
    error::{AppError, AppResult},
    gateway::GatewayPayment,
    middleware::auth::AuthUser,
    models::{Plan, PlanPayment},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub const PLAN_STATUS_ACTIVE: &str = "active";
pub const PAYMENT_APPROVED: &str = "approved";

pub async fn list_plans(state: &AppState) -> AppResult<ApiResponse<PlanList>> {
    let items = Plans::find()
        .filter(PlanCol::Active.eq(true))
        .order_by_asc(PlanCol::Price)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(plan_from_entity)
        .collect();

    Ok(ApiResponse::success("Plans", PlanList { items }, Some(Meta::empty())))
}

pub async fn current_subscription(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CurrentSubscription>> {
    let business = Businesses::find_by_id(user.business_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let plan = match business.plan_id {
        Some(plan_id) => Plans::find_by_id(plan_id)
            .one(&state.orm)
            .await?
            .map(plan_from_entity),
        None => None,
    };

    let payments = PlanPayments::find()
        .filter(PaymentCol::BusinessId.eq(user.business_id))
        .order_by_desc(PaymentCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(payment_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Subscription",
        CurrentSubscription {
            plan,
            plan_status: business.plan_status,
            payments,
        },
        Some(Meta::empty()),
    ))
}

/// Create a payment preference at the gateway for the chosen plan. Single
/// attempt; a gateway failure surfaces as 502 and the caller retries from
/// the UI.
pub async fn subscription_checkout(
    state: &AppState,
    user: &AuthUser,
    payload: SubscribeRequest,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    let plan = Plans::find_by_id(payload.plan_id)
        .filter(PlanCol::Active.eq(true))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let external_reference = format!("{}:{}", user.business_id, plan.id);
    let preference = state
        .gateway
        .create_preference(&plan.name, plan.price, &plan.currency, &external_reference)
        .await?;

    Ok(ApiResponse::success(
        "Checkout preference created",
        CheckoutResponse {
            preference_id: preference.id,
            init_point: preference.init_point,
        },
        Some(Meta::empty()),
    ))
}

/// Webhook entry point. The gateway redelivers aggressively, so the whole
/// handler must be idempotent: dedupe happens on the unique
/// gateway_payment_id column.
pub async fn handle_webhook(
    state: &AppState,
    secret: Option<&str>,
    payload: WebhookNotification,
) -> AppResult<ApiResponse<serde_json::Value>> {
    if let Some(expected) = state.mp_webhook_secret.as_deref() {
        if secret != Some(expected) {
            return Err(AppError::Forbidden);
        }
    }

    let is_payment = payload.kind.as_deref() == Some("payment");
    let payment_id = payload.data.as_ref().map(|d| match &d.id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    });

    let payment_id = match (is_payment, payment_id) {
        (true, Some(id)) => id,
        // Not a payment event; acknowledge so the gateway stops retrying.
        _ => {
            return Ok(ApiResponse::success(
                "Ignored",
                serde_json::json!({}),
                Some(Meta::empty()),
            ));
        }
    };

    let already_recorded = PlanPayments::find()
        .filter(PaymentCol::GatewayPaymentId.eq(payment_id.clone()))
        .one(&state.orm)
        .await?
        .is_some();
    if already_recorded {
        return Ok(ApiResponse::success(
            "Already processed",
            serde_json::json!({ "payment_id": payment_id }),
            Some(Meta::empty()),
        ));
    }

    let payment = state.gateway.get_payment(&payment_id).await?;
    let applied = apply_gateway_payment(state, &payment).await?;

    Ok(ApiResponse::success(
        if applied { "Payment recorded" } else { "Already processed" },
        serde_json::json!({ "payment_id": payment_id }),
        Some(Meta::empty()),
    ))
}

/// Record a gateway payment and, when approved, activate the plan for the
/// business. Returns false when the payment was already recorded (redelivery
/// racing a previous delivery past the dedupe read).
pub async fn apply_gateway_payment(state: &AppState, payment: &GatewayPayment) -> AppResult<bool> {
    let reference = payment
        .external_reference
        .as_deref()
        .ok_or_else(|| AppError::Validation("payment has no external reference".into()))?;
    let (business_id, plan_id) = parse_reference(reference)?;

    let amount_minor = payment
        .transaction_amount
        .map(|a| (a * 100.0).round() as i64)
        .unwrap_or(0);

    let insert = PaymentActive {
        id: Set(Uuid::new_v4()),
        business_id: Set(business_id),
        plan_id: Set(plan_id),
        gateway_payment_id: Set(payment.id.to_string()),
        status: Set(payment.status.clone()),
        amount: Set(amount_minor),
        created_at: NotSet,
    };

    let inserted = PlanPayments::insert(insert)
        .on_conflict(
            OnConflict::column(PaymentCol::GatewayPaymentId)
                .do_nothing()
                .to_owned(),
        )
        .exec(&state.orm)
        .await;
    match inserted {
        Ok(_) => {}
        Err(DbErr::RecordNotInserted) => return Ok(false),
        Err(err) => return Err(err.into()),
    }

    if payment.status == PAYMENT_APPROVED {
        let business = Businesses::find_by_id(business_id)
            .one(&state.orm)
            .await?
            .ok_or(AppError::NotFound)?;
        let mut active: BusinessActive = business.into();
        active.plan_id = Set(Some(plan_id));
        active.plan_status = Set(PLAN_STATUS_ACTIVE.into());
        active.update(&state.orm).await?;
        tracing::info!(%business_id, %plan_id, "plan activated");
    }

    Ok(true)
}

fn parse_reference(reference: &str) -> AppResult<(Uuid, Uuid)> {
    let (business, plan) = reference
        .split_once(':')
        .ok_or_else(|| AppError::Validation("malformed external reference".into()))?;
    let business_id = Uuid::parse_str(business)
        .map_err(|_| AppError::Validation("malformed business id in reference".into()))?;
    let plan_id = Uuid::parse_str(plan)
        .map_err(|_| AppError::Validation("malformed plan id in reference".into()))?;
    Ok((business_id, plan_id))
}

pub fn plan_from_entity(model: PlanModel) -> Plan {
    Plan {
        id: model.id,
        name: model.name,
        price: model.price,
        currency: model.currency,
        features: model.features,
        active: model.active,
    }
}

pub fn payment_from_entity(model: PaymentModel) -> PlanPayment {
    PlanPayment {
        id: model.id,
        business_id: model.business_id,
        plan_id: model.plan_id,
        gateway_payment_id: model.gateway_payment_id,
        status: model.status,
        amount: model.amount,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_business_and_plan_from_reference() {
        let business = Uuid::new_v4();
        let plan = Uuid::new_v4();
        let parsed = parse_reference(&format!("{business}:{plan}")).unwrap();
        assert_eq!(parsed, (business, plan));
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(parse_reference("no-separator").is_err());
        assert!(parse_reference("abc:def").is_err());
    }
}
