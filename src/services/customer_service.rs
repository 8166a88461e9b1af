use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::customers::{
        CreateCustomerRequest, CustomerAccount, CustomerList, RecordPaymentRequest,
        UpdateCustomerRequest,
    },
    entity::{
        account_entries::{
            ActiveModel as EntryActive, Column as EntryCol, Entity as AccountEntries,
            Model as EntryModel,
        },
        customers::{
            ActiveModel as CustomerActive, Column as CustomerCol, Entity as Customers,
            Model as CustomerModel,
        },
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{AccountEntry, Customer},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::sale_service::ENTRY_PAYMENT,
    state::AppState,
};

pub async fn list_customers(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CustomerList>> {
    let (page, limit, offset) = pagination.normalize();
    let condition = Condition::all()
        .add(CustomerCol::BusinessId.eq(user.business_id))
        .add(CustomerCol::DeletedAt.is_null());

    let finder = Customers::find()
        .filter(condition)
        .order_by_asc(CustomerCol::Name);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(customer_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Customers", CustomerList { items }, Some(meta)))
}

pub async fn get_customer(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Customer>> {
    let customer = find_owned(state, user, id).await?;
    Ok(ApiResponse::success("Customer", customer_from_entity(customer), None))
}

pub async fn create_customer(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCustomerRequest,
) -> AppResult<ApiResponse<Customer>> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("customer name is required".into()));
    }
    if payload.credit_limit.is_some_and(|l| l < 0) {
        return Err(AppError::Validation("credit_limit must not be negative".into()));
    }

    let customer = CustomerActive {
        id: Set(Uuid::new_v4()),
        business_id: Set(user.business_id),
        name: Set(payload.name.trim().to_string()),
        email: Set(payload.email),
        phone: Set(payload.phone),
        credit_limit: Set(payload.credit_limit.unwrap_or(0)),
        balance: Set(0),
        deleted_at: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(ApiResponse::success(
        "Customer created",
        customer_from_entity(customer),
        Some(Meta::empty()),
    ))
}

pub async fn update_customer(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCustomerRequest,
) -> AppResult<ApiResponse<Customer>> {
    let existing = find_owned(state, user, id).await?;

    if payload.credit_limit.is_some_and(|l| l < 0) {
        return Err(AppError::Validation("credit_limit must not be negative".into()));
    }

    let mut active: CustomerActive = existing.into();
    if let Some(name) = payload.name {
        if name.trim().is_empty() {
            return Err(AppError::Validation("customer name is required".into()));
        }
        active.name = Set(name.trim().to_string());
    }
    if let Some(email) = payload.email {
        active.email = Set(Some(email));
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(Some(phone));
    }
    if let Some(credit_limit) = payload.credit_limit {
        active.credit_limit = Set(credit_limit);
    }

    let customer = active.update(&state.orm).await?;
    Ok(ApiResponse::success(
        "Updated",
        customer_from_entity(customer),
        Some(Meta::empty()),
    ))
}

pub async fn delete_customer(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = find_owned(state, user, id).await?;

    if existing.balance != 0 {
        return Err(AppError::InvalidState(
            "customer has an outstanding balance".into(),
        ));
    }

    let mut active: CustomerActive = existing.into();
    active.deleted_at = Set(Some(Utc::now().into()));
    active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Running balance plus the full entry history, newest first.
pub async fn get_account(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<CustomerAccount>> {
    let customer = find_owned(state, user, id).await?;

    let entries = AccountEntries::find()
        .filter(EntryCol::CustomerId.eq(customer.id))
        .order_by_desc(EntryCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(entry_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Account",
        CustomerAccount {
            customer: customer_from_entity(customer),
            entries,
        },
        Some(Meta::empty()),
    ))
}

/// Record a payment against the customer's balance.
pub async fn record_payment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: RecordPaymentRequest,
) -> AppResult<ApiResponse<CustomerAccount>> {
    if payload.amount <= 0 {
        return Err(AppError::Validation("amount must be positive".into()));
    }

    let txn = state.orm.begin().await?;

    let customer = Customers::find()
        .filter(CustomerCol::Id.eq(id))
        .filter(CustomerCol::BusinessId.eq(user.business_id))
        .filter(CustomerCol::DeletedAt.is_null())
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if payload.amount > customer.balance {
        return Err(AppError::Validation(format!(
            "payment {} exceeds outstanding balance {}",
            payload.amount, customer.balance
        )));
    }

    let new_balance = customer.balance - payload.amount;
    EntryActive {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer.id),
        sale_id: Set(None),
        kind: Set(ENTRY_PAYMENT.into()),
        amount: Set(payload.amount),
        balance_after: Set(new_balance),
        note: Set(payload.note),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let customer_id = customer.id;
    let mut active: CustomerActive = customer.into();
    active.balance = Set(new_balance);
    let customer = active.update(&txn).await?;

    txn.commit().await?;

    let entries = AccountEntries::find()
        .filter(EntryCol::CustomerId.eq(customer_id))
        .order_by_desc(EntryCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(entry_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "Payment recorded",
        CustomerAccount {
            customer: customer_from_entity(customer),
            entries,
        },
        Some(Meta::empty()),
    ))
}

async fn find_owned(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<CustomerModel> {
    Customers::find()
        .filter(CustomerCol::Id.eq(id))
        .filter(CustomerCol::BusinessId.eq(user.business_id))
        .filter(CustomerCol::DeletedAt.is_null())
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

pub fn customer_from_entity(model: CustomerModel) -> Customer {
    Customer {
        id: model.id,
        business_id: model.business_id,
        name: model.name,
        email: model.email,
        phone: model.phone,
        credit_limit: model.credit_limit,
        balance: model.balance,
        deleted_at: model.deleted_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
    }
}

pub fn entry_from_entity(model: EntryModel) -> AccountEntry {
    AccountEntry {
        id: model.id,
        customer_id: model.customer_id,
        sale_id: model.sale_id,
        kind: model.kind,
        amount: model.amount,
        balance_after: model.balance_after,
        note: model.note,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
