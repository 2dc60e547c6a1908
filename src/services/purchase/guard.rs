use sea_orm::{ConnectionTrait, DbErr};

use crate::{entity::orders::Model as OrderModel, ledger};

/// Result of looking up an idempotency key before any write.
#[derive(Debug)]
pub enum Intent {
    /// An order already exists for this key; replay it.
    AlreadyProcessed(OrderModel),
    /// No order yet. The key is not reserved here: the unique insert in the
    /// reservation transaction is what settles a concurrent race.
    Proceed,
}

pub async fn check<C: ConnectionTrait>(conn: &C, idempotency_key: &str) -> Result<Intent, DbErr> {
    match ledger::find_order_by_key(conn, idempotency_key).await? {
        Some(order) => Ok(Intent::AlreadyProcessed(order)),
        None => Ok(Intent::Proceed),
    }
}
