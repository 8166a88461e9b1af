use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{
    dto::products::ProductList,
    dto::sales::{SaleList, SaleWithItems},
    entity::{
        products::{Column as ProdCol, Entity as Products},
        sale_items::{Column as SaleItemCol, Entity as SaleItems},
        sales::{Column as SaleCol, Entity as Sales},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    response::{ApiResponse, Meta},
    routes::admin::{LowStockQuery, SalesSummary, SalesSummaryQuery},
    routes::params::{SaleListQuery, SortOrder},
    services::product_service::product_from_entity,
    services::sale_service::{SALE_COMPLETED, sale_from_entity, sale_item_from_entity},
    state::AppState,
};

pub async fn list_all_sales(
    state: &AppState,
    user: &AuthUser,
    query: SaleListQuery,
) -> AppResult<ApiResponse<SaleList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all().add(SaleCol::BusinessId.eq(user.business_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(SaleCol::Status.eq(status.clone()));
    }

    let mut finder = Sales::find().filter(condition);

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(SaleCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(SaleCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let sales = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(sale_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Sales", SaleList { items: sales }, Some(meta)))
}

pub async fn get_sale_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<SaleWithItems>> {
    ensure_admin(user)?;
    let sale = Sales::find()
        .filter(SaleCol::Id.eq(id))
        .filter(SaleCol::BusinessId.eq(user.business_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let items = SaleItems::find()
        .filter(SaleItemCol::SaleId.eq(sale.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(sale_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Sale found",
        SaleWithItems {
            sale: sale_from_entity(sale),
            items,
        },
        Some(Meta::empty()),
    ))
}

/// Products at or below their reorder point. An explicit threshold overrides
/// the per-product min_stock comparison.
pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all()
        .add(ProdCol::BusinessId.eq(user.business_id))
        .add(ProdCol::DeletedAt.is_null());
    condition = match query.threshold {
        Some(threshold) => condition.add(ProdCol::Stock.lte(threshold)),
        None => condition.add(Expr::col(ProdCol::Stock).lte(Expr::col(ProdCol::MinStock))),
    };

    let finder = Products::find()
        .filter(condition)
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt);

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
    Ok(ApiResponse::success("Low stock", ProductList { items }, Some(meta)))
}

/// Count and revenue of completed sales in a date range.
pub async fn sales_summary(
    state: &AppState,
    user: &AuthUser,
    query: SalesSummaryQuery,
) -> AppResult<ApiResponse<SalesSummary>> {
    ensure_admin(user)?;

    let mut condition = Condition::all()
        .add(SaleCol::BusinessId.eq(user.business_id))
        .add(SaleCol::Status.eq(SALE_COMPLETED));
    if let Some(from) = query.from {
        condition = condition.add(SaleCol::CreatedAt.gte(from));
    }
    if let Some(to) = query.to {
        condition = condition.add(SaleCol::CreatedAt.lte(to));
    }

    let totals: Vec<i64> = Sales::find()
        .select_only()
        .column(SaleCol::Total)
        .filter(condition)
        .into_tuple()
        .all(&state.orm)
        .await?;

    let summary = SalesSummary {
        count: totals.len() as i64,
        revenue: totals.iter().sum(),
    };
    Ok(ApiResponse::success("Sales summary", summary, Some(Meta::empty())))
}
