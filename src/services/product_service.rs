use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::products::{AdjustStockRequest, CreateProductRequest, ProductList, UpdateProductRequest},
    entity::products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub const STATE_ACTIVE: &str = "ACTIVE";
pub const STATE_DISABLED: &str = "DISABLED";
pub const STATE_OUT_OF_STOCK: &str = "OUT_OF_STOCK";

const VALID_STATES: [&str; 3] = [STATE_ACTIVE, STATE_DISABLED, STATE_OUT_OF_STOCK];

pub async fn list_products(
    state: &AppState,
    user: &AuthUser,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all()
        .add(Column::BusinessId.eq(user.business_id))
        .add(Column::DeletedAt.is_null());

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Sku).ilike(pattern)),
        );
    }

    if let Some(product_state) = query.state.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(Column::State.eq(product_state.clone()));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Name => Column::Name,
        ProductSortBy::Stock => Column::Stock,
        ProductSortBy::SalePrice => Column::SalePrice,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(product_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn get_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Product>> {
    let result = find_owned(state, user, id).await?;
    Ok(ApiResponse::success("Product", product_from_entity(result), None))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("product name is required".into()));
    }
    if payload.stock < 0 || payload.cost_price < 0 || payload.sale_price < 0 {
        return Err(AppError::Validation(
            "stock and prices must not be negative".into(),
        ));
    }

    let initial_state = if payload.stock == 0 {
        STATE_OUT_OF_STOCK
    } else {
        STATE_ACTIVE
    };

    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        business_id: Set(user.business_id),
        name: Set(payload.name.trim().to_string()),
        sku: Set(payload.sku),
        stock: Set(payload.stock),
        min_stock: Set(payload.min_stock.unwrap_or(0)),
        reserved_stock: Set(0),
        cost_price: Set(payload.cost_price),
        sale_price: Set(payload.sale_price),
        state: Set(initial_state.into()),
        category: Set(payload.category),
        supplier: Set(payload.supplier),
        deleted_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let product = active.insert(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        user.business_id,
        Some(user.user_id),
        "product_create",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Product created",
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    let existing = find_owned(state, user, id).await?;

    if let Some(new_state) = payload.state.as_deref() {
        if !VALID_STATES.contains(&new_state) {
            return Err(AppError::Validation("invalid product state".into()));
        }
    }

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        if name.trim().is_empty() {
            return Err(AppError::Validation("product name is required".into()));
        }
        active.name = Set(name.trim().to_string());
    }
    if let Some(sku) = payload.sku {
        active.sku = Set(Some(sku));
    }
    if let Some(min_stock) = payload.min_stock {
        active.min_stock = Set(min_stock);
    }
    if let Some(cost_price) = payload.cost_price {
        active.cost_price = Set(cost_price);
    }
    if let Some(sale_price) = payload.sale_price {
        active.sale_price = Set(sale_price);
    }
    if let Some(product_state) = payload.state {
        active.state = Set(product_state);
    }
    if let Some(category) = payload.category {
        active.category = Set(Some(category));
    }
    if let Some(supplier) = payload.supplier {
        active.supplier = Set(Some(supplier));
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        user.business_id,
        Some(user.user_id),
        "product_update",
        Some("products"),
        Some(serde_json::json!({ "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        product_from_entity(product),
        Some(Meta::empty()),
    ))
}

/// Soft delete: the row stays for sale-item history, but disappears from
/// listings and can no longer be sold.
pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = find_owned(state, user, id).await?;

    let mut active: ActiveModel = existing.into();
    active.deleted_at = Set(Some(Utc::now().into()));
    active.state = Set(STATE_DISABLED.into());
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        user.business_id,
        Some(user.user_id),
        "product_delete",
        Some("products"),
        Some(serde_json::json!({ "product_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn adjust_stock(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AdjustStockRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::Validation("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find()
        .filter(Column::Id.eq(id))
        .filter(Column::BusinessId.eq(user.business_id))
        .filter(Column::DeletedAt.is_null())
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let new_stock = product.stock + payload.delta;
    if new_stock < 0 {
        return Err(AppError::Validation("stock cannot be negative".into()));
    }

    let was_out_of_stock = product.state == STATE_OUT_OF_STOCK;
    let mut active: ActiveModel = product.into();
    active.stock = Set(new_stock);
    if new_stock == 0 {
        active.state = Set(STATE_OUT_OF_STOCK.into());
    } else if was_out_of_stock {
        active.state = Set(STATE_ACTIVE.into());
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        user.business_id,
        Some(user.user_id),
        "stock_adjust",
        Some("products"),
        Some(serde_json::json!({ "product_id": updated.id, "delta": payload.delta })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Stock updated",
        product_from_entity(updated),
        Some(Meta::empty()),
    ))
}

async fn find_owned(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ProductModel> {
    Products::find()
        .filter(Column::Id.eq(id))
        .filter(Column::BusinessId.eq(user.business_id))
        .filter(Column::DeletedAt.is_null())
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

pub fn product_from_entity(model: ProductModel) -> Product {
    Product {
        id: model.id,
        business_id: model.business_id,
        name: model.name,
        sku: model.sku,
        stock: model.stock,
        min_stock: model.min_stock,
        reserved_stock: model.reserved_stock,
        cost_price: model.cost_price,
        sale_price: model.sale_price,
        state: model.state,
        category: model.category,
        supplier: model.supplier,
        deleted_at: model.deleted_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}
