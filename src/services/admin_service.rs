use sea_orm::{ColumnTrait, Condition, TransactionTrait};

use crate::{
    audit::log_audit,
    dto::{orders::OrderList, products::InventoryAdjustRequest},
    entity::orders::Column as OrderCol,
    error::{AppError, AppResult},
    ledger,
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    services::{
        order_service::list_orders_where,
        product_service::{MAX_STOCK, stale_version},
    },
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;

    let mut condition = Condition::all();
    if let Some(product_id) = query.product_id {
        condition = condition.add(OrderCol::ProductId.eq(product_id));
    }
    list_orders_where(state, condition, query).await
}

/// Restock or write off units. Goes through the same version swap as a
/// purchase, so an adjustment racing a sale is rejected rather than merged.
pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: i32,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let product = ledger::find_product(&txn, id)
        .await?
        .ok_or(AppError::NotFound)?;

    let new_stock = product
        .stock_count
        .checked_add(payload.delta)
        .filter(|stock| (0..=MAX_STOCK).contains(stock))
        .ok_or_else(|| {
            AppError::BadRequest(format!("stock must stay between 0 and {MAX_STOCK}"))
        })?;

    if !ledger::swap_stock(&txn, id, product.version, new_stock).await? {
        txn.rollback().await?;
        tracing::warn!(product_id = id, delta = payload.delta, "inventory adjustment lost a race");
        return Err(stale_version());
    }
    let updated = ledger::find_product(&txn, id)
        .await?
        .ok_or(AppError::NotFound)?;
    txn.commit().await?;

    tracing::info!(
        product_id = id,
        delta = payload.delta,
        stock = updated.stock_count,
        "inventory adjusted"
    );

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.user_id),
        "inventory_adjust",
        Some("products"),
        Some(serde_json::json!({ "product_id": id, "delta": payload.delta })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Inventory updated",
        Product::from(updated),
        Some(Meta::empty()),
    ))
}
