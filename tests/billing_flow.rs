use pos_inventory_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    entity::{
        businesses::{self, ActiveModel as BusinessActive, Entity as Businesses},
        plan_payments::{Column as PaymentCol, Entity as PlanPayments},
        plans::ActiveModel as PlanActive,
    },
    gateway::{GatewayPayment, MercadoPago},
    services::billing_service::{self, PLAN_STATUS_ACTIVE},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
    Statement,
};
use uuid::Uuid;

// An approved gateway payment activates the plan once; webhook redelivery
// must be a no-op.
#[tokio::test]
async fn approved_payment_is_applied_once() -> anyhow::Result<()> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let business = BusinessActive {
        id: Set(Uuid::new_v4()),
        name: Set("Billing Test Store".into()),
        plan_id: Set(None),
        plan_status: Set("none".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let plan = PlanActive {
        id: Set(Uuid::new_v4()),
        name: Set("Pro".into()),
        price: Set(150000),
        currency: Set("ARS".into()),
        features: Set(serde_json::json!({"imports": true})),
        active: Set(true),
    }
    .insert(&state.orm)
    .await?;

    let payment = GatewayPayment {
        id: 424242,
        status: "approved".into(),
        external_reference: Some(format!("{}:{}", business.id, plan.id)),
        transaction_amount: Some(1500.0),
    };

    let applied = billing_service::apply_gateway_payment(&state, &payment).await?;
    assert!(applied, "first delivery should be applied");

    // Redelivery of the same gateway payment id is swallowed.
    let applied = billing_service::apply_gateway_payment(&state, &payment).await?;
    assert!(!applied, "redelivery should be a no-op");

    let recorded = PlanPayments::find()
        .filter(PaymentCol::GatewayPaymentId.eq("424242"))
        .count(&state.orm)
        .await?;
    assert_eq!(recorded, 1);

    let business: businesses::Model = Businesses::find_by_id(business.id)
        .one(&state.orm)
        .await?
        .expect("business");
    assert_eq!(business.plan_id, Some(plan.id));
    assert_eq!(business.plan_status, PLAN_STATUS_ACTIVE);

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE account_entries, sale_items, sales, manual_products, products, customers, plan_payments, audit_logs, users, businesses, plans RESTART IDENTITY CASCADE",
    ))
    .await?;

    let pool = create_pool(database_url).await?;
    Ok(AppState {
        pool,
        orm,
        gateway: MercadoPago::new("http://localhost:9", "test-token"),
        jwt_secret: "test-secret".into(),
        mp_webhook_secret: None,
    })
}
