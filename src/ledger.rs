//! Row-level primitives over the `products` and `orders` tables.
//!
//! Every product write goes through a compare-and-swap on `version`, so two
//! writers that based their change on the same read can never both succeed.
//! Orders are append-only; the only constraint they contend on is the unique
//! idempotency key.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};

use crate::entity::{
    orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
    products::{Column as ProdCol, Entity as Products, Model as ProductModel},
};

/// Full set of mutable product fields written by a catalog update.
#[derive(Debug, Clone)]
pub struct ProductWrite {
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub price: Decimal,
    pub stock_count: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub product_id: i32,
    pub buyer_id: &'a str,
    pub quantity: i32,
    pub total_price: Decimal,
    pub idempotency_key: &'a str,
}

pub async fn find_product<C: ConnectionTrait>(
    conn: &C,
    id: i32,
) -> Result<Option<ProductModel>, DbErr> {
    Products::find_by_id(id).one(conn).await
}

pub async fn find_order_by_key<C: ConnectionTrait>(
    conn: &C,
    idempotency_key: &str,
) -> Result<Option<OrderModel>, DbErr> {
    Orders::find()
        .filter(OrderCol::IdempotencyKey.eq(idempotency_key))
        .one(conn)
        .await
}

/// Writes `new_stock` only if the row still carries `expected_version`.
/// Returns `false` when another writer got there first.
pub async fn swap_stock<C: ConnectionTrait>(
    conn: &C,
    id: i32,
    expected_version: i64,
    new_stock: i32,
) -> Result<bool, DbErr> {
    let result = Products::update_many()
        .col_expr(ProdCol::StockCount, Expr::value(new_stock))
        .col_expr(ProdCol::Version, Expr::col(ProdCol::Version).add(1i64))
        .col_expr(ProdCol::UpdatedAt, Expr::value(now()))
        .filter(ProdCol::Id.eq(id))
        .filter(ProdCol::Version.eq(expected_version))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Replaces every mutable field if the row still carries `expected_version`.
pub async fn swap_product<C: ConnectionTrait>(
    conn: &C,
    id: i32,
    expected_version: i64,
    write: ProductWrite,
) -> Result<bool, DbErr> {
    let result = Products::update_many()
        .col_expr(ProdCol::Name, Expr::value(write.name))
        .col_expr(ProdCol::Description, Expr::value(write.description))
        .col_expr(ProdCol::ImageUrl, Expr::value(write.image_url))
        .col_expr(ProdCol::Price, Expr::value(write.price))
        .col_expr(ProdCol::StockCount, Expr::value(write.stock_count))
        .col_expr(ProdCol::IsActive, Expr::value(write.is_active))
        .col_expr(ProdCol::Version, Expr::col(ProdCol::Version).add(1i64))
        .col_expr(ProdCol::UpdatedAt, Expr::value(now()))
        .filter(ProdCol::Id.eq(id))
        .filter(ProdCol::Version.eq(expected_version))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Clears the active flag. With `expected_version` the write is conditional,
/// otherwise it applies to whatever version is current.
pub async fn deactivate_product<C: ConnectionTrait>(
    conn: &C,
    id: i32,
    expected_version: Option<i64>,
) -> Result<bool, DbErr> {
    let mut update = Products::update_many()
        .col_expr(ProdCol::IsActive, Expr::value(false))
        .col_expr(ProdCol::Version, Expr::col(ProdCol::Version).add(1i64))
        .col_expr(ProdCol::UpdatedAt, Expr::value(now()))
        .filter(ProdCol::Id.eq(id));
    if let Some(version) = expected_version {
        update = update.filter(ProdCol::Version.eq(version));
    }
    let result = update.exec(conn).await?;
    Ok(result.rows_affected == 1)
}

/// Appends an order row. A duplicate idempotency key surfaces as the
/// store's unique-constraint error; callers decide what that means.
pub async fn append_order<C: ConnectionTrait>(
    conn: &C,
    order: NewOrder<'_>,
) -> Result<OrderModel, DbErr> {
    OrderActive {
        id: NotSet,
        product_id: Set(order.product_id),
        buyer_id: Set(order.buyer_id.to_owned()),
        quantity: Set(order.quantity),
        total_price: Set(order.total_price),
        idempotency_key: Set(order.idempotency_key.to_owned()),
        ordered_at: Set(now()),
    }
    .insert(conn)
    .await
}

fn now() -> sea_orm::prelude::DateTimeWithTimeZone {
    Utc::now().into()
}
