use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use chrono::Utc;

use crate::{
    audit::log_audit,
    dto::products::{ProductList, ProductUpsertRequest},
    entity::products::{ActiveModel, Column, Entity as Products},
    error::{AppError, AppResult},
    ledger::{self, ProductWrite},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_STOCK: i32 = 10_000;

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(Column::IsActive.eq(true));

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search.to_lowercase());
        condition = condition.add(
            Condition::any()
                .add(Expr::expr(Func::lower(Expr::col(Column::Name))).like(pattern.clone()))
                .add(Expr::expr(Func::lower(Expr::col(Column::Description))).like(pattern)),
        );
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col).order_by_asc(Column::Id),
        SortOrder::Desc => finder.order_by_desc(sort_col).order_by_desc(Column::Id),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    Ok(ApiResponse::paged("Products", ProductList { items }, page, limit, total))
}

/// Soft-deleted products are invisible here, as if they never existed.
pub async fn get_product(state: &AppState, id: i32) -> AppResult<ApiResponse<Product>> {
    let product = Products::find_by_id(id)
        .filter(Column::IsActive.eq(true))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Product", Product::from(product), None))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: ProductUpsertRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_upsert(&payload)?;

    let product = new_product(payload).insert(&state.orm).await?;
    tracing::info!(product_id = product.id, stock = product.stock_count, "product created");

    audit(state, user, "product_create", serde_json::json!({ "product_id": product.id })).await;

    Ok(ApiResponse::success(
        "Product created",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

/// All-or-nothing: one invalid entry rejects the whole batch.
pub async fn create_products_bulk(
    state: &AppState,
    user: &AuthUser,
    payloads: Vec<ProductUpsertRequest>,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    if payloads.is_empty() {
        return Err(AppError::BadRequest("List cannot be empty.".into()));
    }
    for (index, payload) in payloads.iter().enumerate() {
        validate_upsert(payload).map_err(|err| match err {
            AppError::BadRequest(msg) => AppError::BadRequest(format!("item {index}: {msg}")),
            other => other,
        })?;
    }

    let txn = state.orm.begin().await?;
    let mut items = Vec::with_capacity(payloads.len());
    for payload in payloads {
        let product = new_product(payload).insert(&txn).await?;
        items.push(Product::from(product));
    }
    txn.commit().await?;

    let ids: Vec<i32> = items.iter().map(|p| p.id).collect();
    tracing::info!(count = ids.len(), "bulk product create");
    audit(state, user, "product_bulk_create", serde_json::json!({ "product_ids": ids })).await;

    Ok(ApiResponse::success(
        "Bulk addition successful.",
        ProductList { items },
        Some(Meta::empty()),
    ))
}

/// Full replacement guarded by the caller's copy of the version token, so an
/// admin edit never overwrites a stock decrement it has not seen.
pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: i32,
    expected_version: i64,
    payload: ProductUpsertRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_upsert(&payload)?;

    let txn = state.orm.begin().await?;
    let existing = ledger::find_product(&txn, id).await?.ok_or(AppError::NotFound)?;

    let write = ProductWrite {
        name: payload.name,
        description: payload.description,
        image_url: payload.image_url,
        price: payload.price,
        stock_count: payload.stock_count,
        is_active: existing.is_active,
    };
    if existing.version != expected_version
        || !ledger::swap_product(&txn, id, expected_version, write).await?
    {
        txn.rollback().await?;
        tracing::warn!(product_id = id, expected_version, "stale product update rejected");
        return Err(stale_version());
    }

    let product = ledger::find_product(&txn, id).await?.ok_or(AppError::NotFound)?;
    txn.commit().await?;

    audit(
        state,
        user,
        "product_update",
        serde_json::json!({ "product_id": id, "version": product.version }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: i32,
    expected_version: Option<i64>,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    if !ledger::deactivate_product(&state.orm, id, expected_version).await? {
        return match ledger::find_product(&state.orm, id).await? {
            None => Err(AppError::NotFound),
            Some(_) => Err(stale_version()),
        };
    }
    tracing::info!(product_id = id, "product soft deleted");

    audit(state, user, "product_delete", serde_json::json!({ "product_id": id })).await;

    Ok(ApiResponse::success(
        "Soft deleted successfully.",
        serde_json::json!({ "id": id }),
        Some(Meta::empty()),
    ))
}

pub fn validate_upsert(payload: &ProductUpsertRequest) -> Result<(), AppError> {
    let name_len = payload.name.trim().chars().count();
    if name_len == 0 || name_len > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "name must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }
    if payload.price < Decimal::new(1, 2) || payload.price > Decimal::from(1_000_000) {
        return Err(AppError::BadRequest(
            "Price must be between 0.01 and 1000000.".into(),
        ));
    }
    if payload.price.normalize().scale() > 2 {
        return Err(AppError::BadRequest(
            "Price must have at most two decimal places.".into(),
        ));
    }
    if !(0..=MAX_STOCK).contains(&payload.stock_count) {
        return Err(AppError::BadRequest(format!(
            "stock_count must be between 0 and {MAX_STOCK}"
        )));
    }
    Ok(())
}

pub(crate) fn stale_version() -> AppError {
    AppError::Conflict("Concurrency conflict: Product was modified elsewhere.".into())
}

fn new_product(payload: ProductUpsertRequest) -> ActiveModel {
    let now = Utc::now();
    ActiveModel {
        id: NotSet,
        name: Set(payload.name.trim().to_owned()),
        description: Set(payload.description),
        image_url: Set(payload.image_url),
        price: Set(payload.price),
        stock_count: Set(payload.stock_count),
        is_active: Set(true),
        version: Set(1),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
}

async fn audit(state: &AppState, user: &AuthUser, action: &str, metadata: serde_json::Value) {
    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        action,
        Some("products"),
        Some(metadata),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }
}
