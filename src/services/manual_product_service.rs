use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::sales::{LinkManualRequest, ManualProductList, ParseManualRequest},
    entity::{
        manual_products::{
            ActiveModel as ManualActive, Column as ManualCol, Entity as ManualProducts,
            Model as ManualModel,
        },
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::ManualProduct,
    response::{ApiResponse, Meta},
    routes::params::ManualProductQuery,
    services::product_service::STATE_OUT_OF_STOCK,
    state::AppState,
    text::parse_manual_entry,
};

pub const MANUAL_PENDING: &str = "PENDING";
pub const MANUAL_LINKED: &str = "LINKED";
pub const MANUAL_CONVERTED: &str = "CONVERTED";
pub const MANUAL_IGNORED: &str = "IGNORED";

/// Parse a free-text cart line and stage it as a PENDING manual product for
/// the operator to resolve later.
pub async fn parse_and_stage(
    state: &AppState,
    user: &AuthUser,
    payload: ParseManualRequest,
) -> AppResult<ApiResponse<ManualProduct>> {
    let parsed = parse_manual_entry(&payload.text)?;

    let staged = ManualActive {
        id: Set(Uuid::new_v4()),
        business_id: Set(user.business_id),
        original_text: Set(payload.text.clone()),
        name: Set(parsed.name),
        quantity: Set(parsed.quantity),
        price: Set(parsed.price),
        status: Set(MANUAL_PENDING.into()),
        linked_product_id: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(ApiResponse::success(
        "Manual product staged",
        manual_from_entity(staged),
        Some(Meta::empty()),
    ))
}

pub async fn list_manual_products(
    state: &AppState,
    user: &AuthUser,
    query: ManualProductQuery,
) -> AppResult<ApiResponse<ManualProductList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(ManualCol::BusinessId.eq(user.business_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(ManualCol::Status.eq(status.clone()));
    }

    let finder = ManualProducts::find()
        .filter(condition)
        .order_by_desc(ManualCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(manual_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Manual products",
        ManualProductList { items },
        Some(meta),
    ))
}

/// Attach a staged entry to an existing catalog product.
pub async fn link_manual_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: LinkManualRequest,
) -> AppResult<ApiResponse<ManualProduct>> {
    let staged = find_pending(state, user, id).await?;

    let product = Products::find()
        .filter(ProdCol::Id.eq(payload.product_id))
        .filter(ProdCol::BusinessId.eq(user.business_id))
        .filter(ProdCol::DeletedAt.is_null())
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ManualActive = staged.into();
    active.status = Set(MANUAL_LINKED.into());
    active.linked_product_id = Set(Some(product.id));
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        user.business_id,
        Some(user.user_id),
        "manual_product_link",
        Some("manual_products"),
        Some(serde_json::json!({ "manual_id": updated.id, "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Manual product linked",
        manual_from_entity(updated),
        Some(Meta::empty()),
    ))
}

/// Promote a staged entry into a new catalog product built from the parsed
/// triple. Stock starts at zero; the operator adjusts it afterwards.
pub async fn convert_manual_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<ManualProduct>> {
    let staged = find_pending(state, user, id).await?;

    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        business_id: Set(user.business_id),
        name: Set(staged.name.clone()),
        sku: Set(None),
        stock: Set(0),
        min_stock: Set(0),
        reserved_stock: Set(0),
        cost_price: Set(0),
        sale_price: Set(staged.price),
        state: Set(STATE_OUT_OF_STOCK.into()),
        category: Set(None),
        supplier: Set(None),
        deleted_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let mut active: ManualActive = staged.into();
    active.status = Set(MANUAL_CONVERTED.into());
    active.linked_product_id = Set(Some(product.id));
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        user.business_id,
        Some(user.user_id),
        "manual_product_convert",
        Some("manual_products"),
        Some(serde_json::json!({ "manual_id": updated.id, "product_id": product.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Manual product converted",
        manual_from_entity(updated),
        Some(Meta::empty()),
    ))
}

pub async fn ignore_manual_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<ManualProduct>> {
    let staged = find_pending(state, user, id).await?;

    let mut active: ManualActive = staged.into();
    active.status = Set(MANUAL_IGNORED.into());
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Manual product ignored",
        manual_from_entity(updated),
        Some(Meta::empty()),
    ))
}

// Only PENDING entries can transition; anything else already got resolved.
async fn find_pending(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ManualModel> {
    let staged = ManualProducts::find()
        .filter(ManualCol::Id.eq(id))
        .filter(ManualCol::BusinessId.eq(user.business_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if staged.status != MANUAL_PENDING {
        return Err(AppError::InvalidState(format!(
            "manual product is {}, expected PENDING",
            staged.status
        )));
    }
    Ok(staged)
}

pub fn manual_from_entity(model: ManualModel) -> ManualProduct {
    ManualProduct {
        id: model.id,
        business_id: model.business_id,
        original_text: model.original_text,
        name: model.name,
        quantity: model.quantity,
        price: model.price,
        status: model.status,
        linked_product_id: model.linked_product_id,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}
