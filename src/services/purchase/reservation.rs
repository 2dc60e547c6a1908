use rust_decimal::Decimal;
use sea_orm::DatabaseTransaction;

use crate::{
    entity::{orders::Model as OrderModel, products::Model as ProductModel},
    ledger::{self, NewOrder},
};

use super::{PurchaseCommand, conflict::{self, AbortReason}};

#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub product_id: i32,
    pub quantity: i32,
    pub new_stock: i32,
    pub unit_price: Decimal,
}

impl Reservation {
    pub fn total_price(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Reads the product inside `txn`, validates it and decrements its stock.
pub async fn reserve(
    txn: &DatabaseTransaction,
    product_id: i32,
    quantity: i32,
) -> Result<Reservation, AbortReason> {
    let product = ledger::find_product(txn, product_id)
        .await
        .map_err(conflict::classify)?
        .ok_or(AbortReason::NotFound)?;
    reserve_from(txn, &product, quantity).await
}

/// Validates `product` as read earlier in the same transaction and writes the
/// decrement against its version. A row that moved on since that read turns
/// into [`AbortReason::Conflict`].
///
/// Public as a test seam: integration tests hand in a snapshot older than the
/// row to drive the conflict path without racing real connections.
pub async fn reserve_from(
    txn: &DatabaseTransaction,
    product: &ProductModel,
    quantity: i32,
) -> Result<Reservation, AbortReason> {
    if !product.is_active {
        return Err(AbortReason::Inactive);
    }
    if product.stock_count < quantity {
        return Err(AbortReason::InsufficientStock {
            requested: quantity,
            available: product.stock_count,
        });
    }

    let new_stock = product.stock_count - quantity;
    let swapped = ledger::swap_stock(txn, product.id, product.version, new_stock)
        .await
        .map_err(conflict::classify)?;
    if !swapped {
        return Err(AbortReason::Conflict);
    }

    Ok(Reservation {
        product_id: product.id,
        quantity,
        new_stock,
        unit_price: product.price,
    })
}

/// Inserts the order for a reservation made in the same transaction.
pub async fn record(
    txn: &DatabaseTransaction,
    cmd: &PurchaseCommand,
    reservation: &Reservation,
) -> Result<OrderModel, AbortReason> {
    ledger::append_order(
        txn,
        NewOrder {
            product_id: reservation.product_id,
            buyer_id: &cmd.buyer_id,
            quantity: reservation.quantity,
            total_price: reservation.total_price(),
            idempotency_key: &cmd.idempotency_key,
        },
    )
    .await
    .map_err(conflict::classify)
}
