use pos_inventory_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let pool = create_pool(&config.database_url).await?;

    let business_id = ensure_business(&pool, "Demo Store").await?;
    let admin_id = ensure_user(&pool, business_id, "admin@example.com", "admin").await?;
    let operator_id = ensure_user(&pool, business_id, "operator@example.com", "operator").await?;
    seed_plans(&pool).await?;
    seed_products(&pool, business_id).await?;

    println!("Seed completed. Admin ID: {admin_id}, Operator ID: {operator_id}");
    Ok(())
}

async fn ensure_business(pool: &sqlx::PgPool, name: &str) -> anyhow::Result<Uuid> {
    let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM businesses WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO businesses (id, name, plan_status) VALUES ($1, $2, 'none')")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    println!("Created business {name}");
    Ok(id)
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    business_id: Uuid,
    email: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        INSERT INTO users (id, business_id, email, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(business_id)
    .bind(email)
    .bind(role)
    .fetch_optional(pool)
    .await?;

    let user_id = match row {
        Some((id,)) => id,
        None => {
            let existing: (Uuid,) = sqlx::query_as("SELECT id FROM users WHERE email = $1")
                .bind(email)
                .fetch_one(pool)
                .await?;
            existing.0
        }
    };

    println!("Ensured user {email} (role={role})");
    Ok(user_id)
}

async fn seed_plans(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let plans = vec![
        ("Basic", 500000_i64, serde_json::json!({"max_products": 200})),
        ("Pro", 1200000_i64, serde_json::json!({"max_products": 5000, "imports": true})),
    ];

    for (name, price, features) in plans {
        sqlx::query(
            r#"
            INSERT INTO plans (id, name, price, currency, features, active)
            VALUES ($1, $2, $3, 'ARS', $4, TRUE)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(price)
        .bind(features)
        .execute(pool)
        .await?;
    }

    println!("Seeded plans");
    Ok(())
}

async fn seed_products(pool: &sqlx::PgPool, business_id: Uuid) -> anyhow::Result<()> {
    let products = vec![
        ("Agua Mineral 500ml", Some("AGU-500"), 120, 90000_i64),
        ("Gaseosa Cola 1.5L", Some("GAS-150"), 60, 250000_i64),
        ("Galletitas Surtidas", Some("GAL-001"), 80, 150000_i64),
        ("Yerba Mate 1kg", None, 40, 480000_i64),
    ];

    for (name, sku, stock, sale_price) in products {
        let exists: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM products WHERE business_id = $1 AND name = $2",
        )
        .bind(business_id)
        .bind(name)
        .fetch_optional(pool)
        .await?;
        if exists.is_some() {
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO products (id, business_id, name, sku, stock, min_stock, sale_price, state)
            VALUES ($1, $2, $3, $4, $5, 5, $6, 'ACTIVE')
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(name)
        .bind(sku)
        .bind(stock)
        .bind(sale_price)
        .execute(pool)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
