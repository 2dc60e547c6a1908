use sea_orm::{DatabaseConnection, DbErr, RuntimeErr, SqlErr, TransactionTrait};

use crate::entity::orders::Model as OrderModel;

use super::{PurchaseCommand, reservation};

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Why a reservation attempt was rolled back.
#[derive(Debug)]
pub enum AbortReason {
    NotFound,
    Inactive,
    InsufficientStock { requested: i32, available: i32 },
    /// The product row changed between our read and our write.
    Conflict,
    /// Another transaction already committed an order under this key.
    DuplicateIntent,
    Store(DbErr),
}

/// A committed attempt: the order row and the stock left behind it.
#[derive(Debug, Clone)]
pub struct Committed {
    pub order: OrderModel,
    pub new_stock: i32,
}

/// Sorts a storage error into the branches the orchestrator cares about.
pub fn classify(err: DbErr) -> AbortReason {
    if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
        return AbortReason::DuplicateIntent;
    }
    match sqlstate(&err).as_deref() {
        Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => AbortReason::Conflict,
        _ => AbortReason::Store(err),
    }
}

fn sqlstate(err: &DbErr) -> Option<String> {
    let runtime = match err {
        DbErr::Exec(runtime) | DbErr::Query(runtime) | DbErr::Conn(runtime) => runtime,
        _ => return None,
    };
    match runtime {
        RuntimeErr::SqlxError(sqlx::Error::Database(db)) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}

/// Runs reservation and order insert as one transaction. Any abort rolls the
/// whole attempt back. Conflicts are not retried here: the caller resubmits
/// with the same idempotency key.
pub async fn run_attempt(
    db: &DatabaseConnection,
    cmd: &PurchaseCommand,
) -> Result<Committed, AbortReason> {
    let txn = db.begin().await.map_err(classify)?;

    let attempt = async {
        let reservation = reservation::reserve(&txn, cmd.product_id, cmd.quantity).await?;
        let order = reservation::record(&txn, cmd, &reservation).await?;
        Ok::<_, AbortReason>(Committed {
            order,
            new_stock: reservation.new_stock,
        })
    }
    .await;

    match attempt {
        Ok(committed) => {
            txn.commit().await.map_err(classify)?;
            Ok(committed)
        }
        Err(reason) => {
            if let Err(err) = txn.rollback().await {
                tracing::warn!(error = %err, "rollback failed; connection discards the transaction");
            }
            Err(reason)
        }
    }
}
