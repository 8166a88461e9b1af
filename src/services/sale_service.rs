use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::sales::{CreateSaleRequest, DiscountInput, DiscountType, SaleList, SaleWithItems},
    entity::{
        account_entries::ActiveModel as EntryActive,
        customers::{ActiveModel as CustomerActive, Column as CustomerCol, Entity as Customers},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        sale_items::{
            ActiveModel as SaleItemActive, Column as SaleItemCol, Entity as SaleItems,
            Model as SaleItemModel,
        },
        sales::{ActiveModel as SaleActive, Column as SaleCol, Entity as Sales, Model as SaleModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Sale, SaleItem},
    response::{ApiResponse, Meta},
    routes::params::{SaleListQuery, SortOrder},
    services::product_service::{STATE_ACTIVE, STATE_OUT_OF_STOCK},
    state::AppState,
};

pub const SALE_COMPLETED: &str = "COMPLETED";
pub const SALE_CANCELLED: &str = "CANCELLED";

pub const ENTRY_DEBIT: &str = "DEBIT";
pub const ENTRY_PAYMENT: &str = "PAYMENT";

/// Upper bound on a single sale in minor units (10^15, roughly ten trillion
/// in major units). Keeps the totals arithmetic far from i64 limits.
pub const MAX_SALE_AMOUNT: i64 = 1_000_000_000_000_000;

#[derive(Debug, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: i64,
    pub discount_amount: i64,
    pub tax_amount: i64,
    pub total: i64,
}

/// Server-side totals computation. Discount applies to the subtotal and is
/// clamped so the discounted amount never goes negative; tax applies to the
/// post-discount amount. Integer arithmetic in minor units, rounding toward
/// zero. Rate products are taken through i128 so the math cannot overflow
/// for any subtotal within `MAX_SALE_AMOUNT`.
pub fn compute_totals(subtotal: i64, discount: Option<&DiscountInput>, tax_rate_bps: i32) -> Totals {
    let raw_discount = match discount {
        Some(d) => match d.discount_type {
            DiscountType::Percentage => (subtotal as i128 * d.value as i128 / 10_000) as i64,
            DiscountType::Fixed => d.value,
        },
        None => 0,
    };
    let discount_amount = raw_discount.clamp(0, subtotal);
    let after_discount = subtotal - discount_amount;
    let tax_amount = (after_discount as i128 * tax_rate_bps as i128 / 10_000) as i64;
    Totals {
        subtotal,
        discount_amount,
        tax_amount,
        total: after_discount + tax_amount,
    }
}

// Percentage discounts are basis points of the subtotal; anything above
// 100% can only be a client bug.
fn check_discount(discount: &DiscountInput) -> AppResult<()> {
    match discount.discount_type {
        DiscountType::Percentage => {
            if !(0..=10_000).contains(&discount.value) {
                return Err(AppError::Validation(
                    "percentage discount must be within 0..=10000 basis points".into(),
                ));
            }
        }
        DiscountType::Fixed => {
            if discount.value < 0 {
                return Err(AppError::Validation(
                    "discount value must not be negative".into(),
                ));
            }
        }
    }
    Ok(())
}

// Payload items after validation, before catalog prices are known.
enum LineItem {
    Manual {
        name: String,
        quantity: i32,
        unit_price: i64,
    },
    Catalog {
        product_id: Uuid,
        quantity: i32,
    },
}

struct ResolvedItem {
    product_id: Option<Uuid>,
    name: String,
    quantity: i32,
    unit_price: i64,
    is_manual: bool,
}

pub async fn create_sale(
    state: &AppState,
    user: &AuthUser,
    payload: CreateSaleRequest,
) -> AppResult<ApiResponse<SaleWithItems>> {
    if payload.items.is_empty() {
        return Err(AppError::Validation("sale has no items".into()));
    }
    if payload.payment_method.trim().is_empty() {
        return Err(AppError::Validation("payment_method is required".into()));
    }
    let tax_rate_bps = payload.tax_rate_bps.unwrap_or(0);
    if !(0..=10_000).contains(&tax_rate_bps) {
        return Err(AppError::Validation("tax_rate_bps must be within 0..=10000".into()));
    }
    if let Some(d) = payload.discount.as_ref() {
        check_discount(d)?;
    }

    // One validation pass turns the payload into typed lines, aggregating
    // per-product quantities so a product repeated across lines is
    // stock-checked once with its summed quantity.
    let mut lines: Vec<LineItem> = Vec::with_capacity(payload.items.len());
    let mut needed: HashMap<Uuid, i32> = HashMap::new();
    for item in &payload.items {
        if item.quantity < 1 {
            return Err(AppError::Validation("item quantity must be at least 1".into()));
        }
        if item.manual {
            let name = item
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| AppError::Validation("manual item requires a name".into()))?;
            let unit_price = match item.unit_price {
                Some(p) if p >= 0 => p,
                _ => {
                    return Err(AppError::Validation(
                        "manual item requires a non-negative unit_price".into(),
                    ));
                }
            };
            lines.push(LineItem::Manual {
                name: name.to_string(),
                quantity: item.quantity,
                unit_price,
            });
        } else {
            let product_id = item
                .product_id
                .ok_or_else(|| AppError::Validation("catalog item requires product_id".into()))?;
            *needed.entry(product_id).or_insert(0) += item.quantity;
            lines.push(LineItem::Catalog {
                product_id,
                quantity: item.quantity,
            });
        }
    }

    let txn = state.orm.begin().await?;

    // Lock the touched product rows for the duration of the transaction so
    // concurrent checkouts cannot both pass the stock check.
    let mut products: HashMap<Uuid, ProductModel> = HashMap::new();
    if !needed.is_empty() {
        let ids: Vec<Uuid> = needed.keys().copied().collect();
        let rows = Products::find()
            .filter(ProdCol::Id.is_in(ids))
            .filter(ProdCol::BusinessId.eq(user.business_id))
            .lock(LockType::Update)
            .all(&txn)
            .await?;
        for row in rows {
            products.insert(row.id, row);
        }
    }

    for (product_id, quantity) in &needed {
        let product = products.get(product_id).ok_or(AppError::NotFound)?;
        if product.deleted_at.is_some() || product.state != STATE_ACTIVE {
            return Err(AppError::Validation(format!(
                "product '{}' is not active",
                product.name
            )));
        }
        if product.stock < *quantity {
            return Err(AppError::InsufficientStock(format!(
                "product '{}' has {} in stock, {} requested",
                product.name, product.stock, quantity
            )));
        }
    }

    // Unit prices for catalog items come from the locked rows, never from
    // the client payload.
    let mut resolved: Vec<ResolvedItem> = Vec::with_capacity(lines.len());
    for line in lines {
        match line {
            LineItem::Manual {
                name,
                quantity,
                unit_price,
            } => resolved.push(ResolvedItem {
                product_id: None,
                name,
                quantity,
                unit_price,
                is_manual: true,
            }),
            LineItem::Catalog {
                product_id,
                quantity,
            } => {
                let product = products.get(&product_id).ok_or(AppError::NotFound)?;
                resolved.push(ResolvedItem {
                    product_id: Some(product_id),
                    name: product.name.clone(),
                    quantity,
                    unit_price: product.sale_price,
                    is_manual: false,
                });
            }
        }
    }

    let mut subtotal: i64 = 0;
    for item in &resolved {
        let line_total = (item.quantity as i64)
            .checked_mul(item.unit_price)
            .filter(|t| *t <= MAX_SALE_AMOUNT)
            .ok_or_else(|| AppError::Validation("sale amount too large".into()))?;
        subtotal += line_total;
        if subtotal > MAX_SALE_AMOUNT {
            return Err(AppError::Validation("sale amount too large".into()));
        }
    }
    let totals = compute_totals(subtotal, payload.discount.as_ref(), tax_rate_bps);

    // The client may echo its cart total for cross-checking, but the server
    // figure is authoritative; a mismatch rejects the request.
    if let Some(client_total) = payload.total {
        if client_total != totals.total {
            return Err(AppError::Validation(format!(
                "client total {} does not match computed total {}",
                client_total, totals.total
            )));
        }
    }

    let customer = match payload.customer_id {
        Some(customer_id) => Some(
            Customers::find()
                .filter(CustomerCol::Id.eq(customer_id))
                .filter(CustomerCol::BusinessId.eq(user.business_id))
                .filter(CustomerCol::DeletedAt.is_null())
                .lock(LockType::Update)
                .one(&txn)
                .await?
                .ok_or(AppError::NotFound)?,
        ),
        None => None,
    };

    // A credit sale must carry a customer whose limit can absorb the total;
    // holding the model here means the debit block below cannot run without one.
    let credit_customer = match (payload.is_credit, customer) {
        (true, Some(customer)) => {
            if customer.credit_limit > 0 && customer.balance + totals.total > customer.credit_limit
            {
                return Err(AppError::Validation(format!(
                    "credit limit exceeded for customer '{}'",
                    customer.name
                )));
            }
            Some(customer)
        }
        (true, None) => {
            return Err(AppError::Validation("credit sale requires a customer".into()));
        }
        (false, _) => None,
    };

    let sale_id = Uuid::new_v4();
    let (discount_type, discount_value) = match payload.discount.as_ref() {
        Some(d) => (
            Some(
                match d.discount_type {
                    DiscountType::Percentage => "PERCENTAGE",
                    DiscountType::Fixed => "FIXED",
                }
                .to_string(),
            ),
            d.value,
        ),
        None => (None, 0),
    };

    let sale = SaleActive {
        id: Set(sale_id),
        business_id: Set(user.business_id),
        customer_id: Set(payload.customer_id),
        status: Set(SALE_COMPLETED.into()),
        payment_method: Set(payload.payment_method.clone()),
        is_credit: Set(payload.is_credit),
        subtotal: Set(totals.subtotal),
        discount_amount: Set(totals.discount_amount),
        tax_amount: Set(totals.tax_amount),
        total: Set(totals.total),
        tax_rate_bps: Set(tax_rate_bps),
        discount_type: Set(discount_type),
        discount_value: Set(discount_value),
        created_at: NotSet,
        updated_at: NotSet,
        cancelled_at: Set(None),
    }
    .insert(&txn)
    .await?;

    let mut sale_items: Vec<SaleItem> = Vec::new();
    for item in &resolved {
        let inserted = SaleItemActive {
            id: Set(Uuid::new_v4()),
            sale_id: Set(sale.id),
            product_id: Set(item.product_id),
            name: Set(item.name.clone()),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            is_manual: Set(item.is_manual),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        sale_items.push(sale_item_from_entity(inserted));
    }

    for (product_id, quantity) in &needed {
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(*quantity))
            .col_expr(ProdCol::UpdatedAt, Expr::value(Utc::now()))
            .filter(ProdCol::Id.eq(*product_id))
            .exec(&txn)
            .await?;

        let remaining = products
            .get(product_id)
            .map(|p| p.stock - quantity)
            .unwrap_or_default();
        if remaining == 0 {
            Products::update_many()
                .col_expr(ProdCol::State, Expr::value(STATE_OUT_OF_STOCK))
                .filter(ProdCol::Id.eq(*product_id))
                .exec(&txn)
                .await?;
        }
    }

    if let Some(customer) = credit_customer {
        let new_balance = customer.balance + totals.total;
        EntryActive {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer.id),
            sale_id: Set(Some(sale.id)),
            kind: Set(ENTRY_DEBIT.into()),
            amount: Set(totals.total),
            balance_after: Set(new_balance),
            note: Set(None),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;

        let mut active: CustomerActive = customer.into();
        active.balance = Set(new_balance);
        active.update(&txn).await?;
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        user.business_id,
        Some(user.user_id),
        "sale_create",
        Some("sales"),
        Some(serde_json::json!({ "sale_id": sale.id, "total": sale.total })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Sale created",
        SaleWithItems {
            sale: sale_from_entity(sale),
            items: sale_items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn cancel_sale(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<SaleWithItems>> {
    let txn = state.orm.begin().await?;

    let sale = Sales::find()
        .filter(
            Condition::all()
                .add(SaleCol::Id.eq(id))
                .add(SaleCol::BusinessId.eq(user.business_id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if sale.status == SALE_CANCELLED {
        return Err(AppError::InvalidState("sale is already cancelled".into()));
    }

    let items = SaleItems::find()
        .filter(SaleItemCol::SaleId.eq(sale.id))
        .all(&txn)
        .await?;

    // Restore stock for catalog items; manual items never touched stock.
    for item in &items {
        let Some(product_id) = item.product_id else {
            continue;
        };
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(item.quantity))
            .col_expr(ProdCol::UpdatedAt, Expr::value(Utc::now()))
            .filter(ProdCol::Id.eq(product_id))
            .exec(&txn)
            .await?;
        Products::update_many()
            .col_expr(ProdCol::State, Expr::value(STATE_ACTIVE))
            .filter(ProdCol::Id.eq(product_id))
            .filter(ProdCol::State.eq(STATE_OUT_OF_STOCK))
            .exec(&txn)
            .await?;
    }

    // A credit sale debited the customer's account; compensate with a
    // payment entry of the same amount.
    if sale.is_credit {
        if let Some(customer_id) = sale.customer_id {
            let customer = Customers::find()
                .filter(CustomerCol::Id.eq(customer_id))
                .lock(LockType::Update)
                .one(&txn)
                .await?
                .ok_or(AppError::NotFound)?;
            let new_balance = customer.balance - sale.total;
            EntryActive {
                id: Set(Uuid::new_v4()),
                customer_id: Set(customer.id),
                sale_id: Set(Some(sale.id)),
                kind: Set(ENTRY_PAYMENT.into()),
                amount: Set(sale.total),
                balance_after: Set(new_balance),
                note: Set(Some("sale cancelled".into())),
                created_at: NotSet,
            }
            .insert(&txn)
            .await?;

            let mut active: CustomerActive = customer.into();
            active.balance = Set(new_balance);
            active.update(&txn).await?;
        }
    }

    let mut active: SaleActive = sale.into();
    active.status = Set(SALE_CANCELLED.into());
    active.cancelled_at = Set(Some(Utc::now().into()));
    active.updated_at = Set(Utc::now().into());
    let sale = active.update(&txn).await?;

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        user.business_id,
        Some(user.user_id),
        "sale_cancel",
        Some("sales"),
        Some(serde_json::json!({ "sale_id": sale.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let items = items.into_iter().map(sale_item_from_entity).collect();
    Ok(ApiResponse::success(
        "Sale cancelled",
        SaleWithItems {
            sale: sale_from_entity(sale),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_sales(
    state: &AppState,
    user: &AuthUser,
    query: SaleListQuery,
) -> AppResult<ApiResponse<SaleList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(SaleCol::BusinessId.eq(user.business_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(SaleCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Sales::find().filter(condition);
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
    Ok(ApiResponse::success("Ok", SaleList { items: sales }, Some(meta)))
}

pub async fn get_sale(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<SaleWithItems>> {
    let sale = Sales::find()
        .filter(
            Condition::all()
                .add(SaleCol::Id.eq(id))
                .add(SaleCol::BusinessId.eq(user.business_id)),
        )
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
        "OK",
        SaleWithItems {
            sale: sale_from_entity(sale),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub fn sale_from_entity(model: SaleModel) -> Sale {
    Sale {
        id: model.id,
        business_id: model.business_id,
        customer_id: model.customer_id,
        status: model.status,
        payment_method: model.payment_method,
        is_credit: model.is_credit,
        subtotal: model.subtotal,
        discount_amount: model.discount_amount,
        tax_amount: model.tax_amount,
        total: model.total,
        tax_rate_bps: model.tax_rate_bps,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
        cancelled_at: model.cancelled_at.map(|dt| dt.with_timezone(&Utc)),
    }
}

pub fn sale_item_from_entity(model: SaleItemModel) -> SaleItem {
    SaleItem {
        id: model.id,
        sale_id: model.sale_id,
        product_id: model.product_id,
        name: model.name,
        quantity: model.quantity,
        unit_price: model.unit_price,
        is_manual: model.is_manual,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn percentage(bps: i64) -> DiscountInput {
        DiscountInput {
            discount_type: DiscountType::Percentage,
            value: bps,
        }
    }

    fn fixed(amount: i64) -> DiscountInput {
        DiscountInput {
            discount_type: DiscountType::Fixed,
            value: amount,
        }
    }

    #[test]
    fn totals_without_discount_or_tax() {
        let totals = compute_totals(5000, None, 0);
        assert_eq!(totals.total, 5000);
        assert_eq!(totals.discount_amount, 0);
        assert_eq!(totals.tax_amount, 0);
    }

    #[test]
    fn percentage_discount_then_tax_on_discounted_amount() {
        // 10% off 10000 = 9000, 21% IVA on 9000 = 1890.
        let totals = compute_totals(10_000, Some(&percentage(1_000)), 2_100);
        assert_eq!(totals.discount_amount, 1_000);
        assert_eq!(totals.tax_amount, 1_890);
        assert_eq!(totals.total, 10_890);
        assert_eq!(
            totals.total,
            totals.subtotal - totals.discount_amount + totals.tax_amount
        );
    }

    #[test]
    fn fixed_discount_is_clamped_to_subtotal() {
        let totals = compute_totals(500, Some(&fixed(2_000)), 0);
        assert_eq!(totals.discount_amount, 500);
        assert_eq!(totals.total, 0);
    }

    #[test]
    fn integer_division_rounds_toward_zero() {
        // 3% of 99 = 2.97 -> 2.
        let totals = compute_totals(99, Some(&percentage(300)), 0);
        assert_eq!(totals.discount_amount, 2);
        assert_eq!(totals.total, 97);
    }

    #[test]
    fn rejects_out_of_range_percentage_discount() {
        assert!(check_discount(&percentage(10_001)).is_err());
        assert!(check_discount(&percentage(i64::MAX)).is_err());
        assert!(check_discount(&percentage(-1)).is_err());
        assert!(check_discount(&fixed(-1)).is_err());
        assert!(check_discount(&percentage(10_000)).is_ok());
        assert!(check_discount(&fixed(0)).is_ok());
    }

    #[test]
    fn totals_stay_exact_at_the_sale_amount_cap() {
        // Full 100% discount on the largest permitted subtotal, then max tax
        // on the zero remainder.
        let totals = compute_totals(MAX_SALE_AMOUNT, Some(&percentage(10_000)), 2_100);
        assert_eq!(totals.discount_amount, MAX_SALE_AMOUNT);
        assert_eq!(totals.total, 0);

        // No discount, 21% tax at the cap.
        let totals = compute_totals(MAX_SALE_AMOUNT, None, 2_100);
        assert_eq!(totals.tax_amount, MAX_SALE_AMOUNT / 10_000 * 2_100);
        assert_eq!(totals.total, MAX_SALE_AMOUNT + totals.tax_amount);
    }
}
