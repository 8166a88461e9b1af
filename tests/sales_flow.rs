use pos_inventory_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        customers::{CreateCustomerRequest, RecordPaymentRequest},
        products::CreateProductRequest,
        sales::{CreateSaleRequest, SaleItemInput},
    },
    entity::{businesses::ActiveModel as BusinessActive, users::ActiveModel as UserActive},
    error::AppError,
    gateway::MercadoPago,
    middleware::auth::AuthUser,
    services::{customer_service, product_service, sale_service},
    services::sale_service::{ENTRY_DEBIT, ENTRY_PAYMENT, SALE_CANCELLED, SALE_COMPLETED},
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

// Integration flow: checkout with catalog and manual items, stock decrement,
// insufficient-stock rejection, credit sales, cancellation with restock.
#[tokio::test]
async fn checkout_cancel_and_credit_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
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
    let (business_id, user_id) = seed_business(&state, "admin@example.com").await?;
    let auth = AuthUser {
        user_id,
        business_id,
        role: "admin".into(),
    };

    let created = product_service::create_product(
        &state,
        &auth,
        CreateProductRequest {
            name: "Agua Mineral".into(),
            sku: Some("AGU-01".into()),
            stock: 10,
            min_stock: Some(2),
            cost_price: 50000,
            sale_price: 90000,
            category: None,
            supplier: None,
        },
    )
    .await?;
    let product = created.data.unwrap();

    // Catalog item plus a manual line the operator typed in.
    let sale_resp = sale_service::create_sale(
        &state,
        &auth,
        CreateSaleRequest {
            items: vec![
                SaleItemInput {
                    product_id: Some(product.id),
                    name: None,
                    quantity: 2,
                    unit_price: None,
                    manual: false,
                },
                SaleItemInput {
                    product_id: None,
                    name: Some("flete".into()),
                    quantity: 1,
                    unit_price: Some(50000),
                    manual: true,
                },
            ],
            payment_method: "cash".into(),
            customer_id: None,
            is_credit: false,
            discount: None,
            tax_rate_bps: None,
            total: None,
        },
    )
    .await?;
    let sale = sale_resp.data.unwrap();
    assert_eq!(sale.sale.status, SALE_COMPLETED);
    assert_eq!(sale.sale.subtotal, 2 * 90000 + 50000);
    assert_eq!(sale.sale.total, 230000);
    assert_eq!(sale.items.len(), 2);

    let after = product_service::get_product(&state, &auth, product.id).await?;
    assert_eq!(after.data.unwrap().stock, 8);

    // Asking for more than remains must fail and leave stock untouched.
    let err = sale_service::create_sale(
        &state,
        &auth,
        CreateSaleRequest {
            items: vec![SaleItemInput {
                product_id: Some(product.id),
                name: None,
                quantity: 100,
                unit_price: None,
                manual: false,
            }],
            payment_method: "cash".into(),
            customer_id: None,
            is_credit: false,
            discount: None,
            tax_rate_bps: None,
            total: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(_)));

    let after = product_service::get_product(&state, &auth, product.id).await?;
    assert_eq!(after.data.unwrap().stock, 8);

    // A client total that disagrees with the server computation is rejected.
    let err = sale_service::create_sale(
        &state,
        &auth,
        CreateSaleRequest {
            items: vec![SaleItemInput {
                product_id: Some(product.id),
                name: None,
                quantity: 1,
                unit_price: None,
                manual: false,
            }],
            payment_method: "cash".into(),
            customer_id: None,
            is_credit: false,
            discount: None,
            tax_rate_bps: None,
            total: Some(1),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Cancel restores stock and flips status.
    let cancelled = sale_service::cancel_sale(&state, &auth, sale.sale.id).await?;
    assert_eq!(cancelled.data.unwrap().sale.status, SALE_CANCELLED);
    let after = product_service::get_product(&state, &auth, product.id).await?;
    assert_eq!(after.data.unwrap().stock, 10);

    // Cancelling twice is a state conflict.
    let err = sale_service::cancel_sale(&state, &auth, sale.sale.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    credit_flow(&state, &auth, product.id).await?;

    Ok(())
}

async fn credit_flow(state: &AppState, auth: &AuthUser, product_id: Uuid) -> anyhow::Result<()> {
    let customer = customer_service::create_customer(
        state,
        auth,
        CreateCustomerRequest {
            name: "Maria Lopez".into(),
            email: None,
            phone: None,
            credit_limit: Some(500000),
        },
    )
    .await?
    .data
    .unwrap();

    let sale = sale_service::create_sale(
        state,
        auth,
        CreateSaleRequest {
            items: vec![SaleItemInput {
                product_id: Some(product_id),
                name: None,
                quantity: 1,
                unit_price: None,
                manual: false,
            }],
            payment_method: "credit".into(),
            customer_id: Some(customer.id),
            is_credit: true,
            discount: None,
            tax_rate_bps: None,
            total: None,
        },
    )
    .await?
    .data
    .unwrap();

    // Credit sale debits the customer account.
    let account = customer_service::get_account(state, auth, customer.id)
        .await?
        .data
        .unwrap();
    assert_eq!(account.customer.balance, sale.sale.total);
    assert_eq!(account.entries.len(), 1);
    assert_eq!(account.entries[0].kind, ENTRY_DEBIT);
    assert_eq!(account.entries[0].sale_id, Some(sale.sale.id));

    // Partial payment brings the balance down and appends an entry.
    let account = customer_service::record_payment(
        state,
        auth,
        customer.id,
        RecordPaymentRequest {
            amount: 40000,
            note: Some("efectivo".into()),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(account.customer.balance, sale.sale.total - 40000);

    // Cancelling a credit sale writes a compensating payment entry.
    sale_service::cancel_sale(state, auth, sale.sale.id).await?;
    let account = customer_service::get_account(state, auth, customer.id)
        .await?
        .data
        .unwrap();
    assert_eq!(account.customer.balance, -40000);
    assert!(account.entries.iter().any(|e| e.kind == ENTRY_PAYMENT));

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE account_entries, sale_items, sales, manual_products, products, customers, plan_payments, audit_logs, users, businesses, plans RESTART IDENTITY CASCADE",
    ))
    .await?;

    let pool = create_pool(database_url).await?;
    let config = test_config(database_url);
    Ok(AppState {
        pool,
        orm,
        gateway: MercadoPago::new(&config.mp_base_url, &config.mp_access_token),
        jwt_secret: config.jwt_secret,
        mp_webhook_secret: None,
    })
}

fn test_config(database_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "test-secret".into(),
        mp_access_token: "test-token".into(),
        mp_base_url: "http://localhost:9".into(),
        mp_webhook_secret: None,
    }
}

async fn seed_business(state: &AppState, email: &str) -> anyhow::Result<(Uuid, Uuid)> {
    let business = BusinessActive {
        id: Set(Uuid::new_v4()),
        name: Set("Test Store".into()),
        plan_id: Set(None),
        plan_status: Set("none".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        business_id: Set(business.id),
        email: Set(email.to_string()),
        role: Set("admin".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok((business.id, user.id))
}
