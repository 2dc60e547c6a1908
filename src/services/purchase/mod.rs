//! The purchase core.
//!
//! A purchase runs `Started -> (IdempotencyHit | Reserving) -> (Committed | Aborted)`:
//! the [`guard`] answers repeats of a known idempotency key without writing,
//! otherwise [`conflict::run_attempt`] reserves stock and appends the order in
//! one transaction. Aborted attempts leave nothing behind.

pub mod conflict;
pub mod guard;
pub mod reservation;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    audit::log_audit, entity::orders::Model as OrderModel, ledger, state::AppState,
};

use self::{
    conflict::{AbortReason, Committed},
    guard::Intent,
};

pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 100;

#[derive(Debug, Clone)]
pub struct PurchaseCommand {
    pub product_id: i32,
    pub quantity: i32,
    /// Authenticated buyer, opaque to the core.
    pub buyer_id: String,
    pub idempotency_key: String,
}

impl PurchaseCommand {
    /// Shape checks that never need the database.
    pub fn validate(&self) -> Result<(), PurchaseError> {
        if self.quantity < 1 {
            return Err(PurchaseError::InvalidInput(
                "quantity must be at least 1".into(),
            ));
        }
        if self.idempotency_key.trim().is_empty() {
            return Err(PurchaseError::InvalidInput(
                "X-Idempotency-Key header is required for flash sales".into(),
            ));
        }
        if self.idempotency_key.chars().count() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(PurchaseError::InvalidInput(format!(
                "idempotency key must be at most {MAX_IDEMPOTENCY_KEY_LEN} characters"
            )));
        }
        if self.buyer_id.trim().is_empty() {
            return Err(PurchaseError::InvalidInput("buyer identity is missing".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PurchaseReceipt {
    pub order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    #[schema(value_type = String, example = "199.98")]
    pub total_price: Decimal,
    pub ordered_at: DateTime<Utc>,
    /// True when the order already existed for this idempotency key.
    pub replayed: bool,
}

impl PurchaseReceipt {
    fn from_order(order: &OrderModel, replayed: bool) -> Self {
        Self {
            order_id: order.id,
            product_id: order.product_id,
            quantity: order.quantity,
            total_price: order.total_price,
            ordered_at: order.ordered_at.with_timezone(&Utc),
            replayed,
        }
    }
}

#[derive(Debug, Error)]
pub enum PurchaseError {
    #[error("Invalid purchase request: {0}")]
    InvalidInput(String),

    #[error("Product {0} no longer exists.")]
    NotFound(i32),

    #[error("Product {0} is currently unavailable.")]
    Inactive(i32),

    #[error("Item is sold out! Requested {requested}, {available} left.")]
    InsufficientStock { requested: i32, available: i32 },

    #[error("High traffic detected. Please try your purchase again.")]
    Conflict,

    #[error("A critical error occurred during your purchase: {0}")]
    SystemFailure(String),
}

impl PurchaseError {
    pub fn code(&self) -> &'static str {
        match self {
            PurchaseError::InvalidInput(_) => "INVALID_PURCHASE_REQUEST",
            PurchaseError::NotFound(_) => "PURCHASE_PRODUCT_NOT_FOUND",
            PurchaseError::Inactive(_) => "PURCHASE_PRODUCT_INACTIVE",
            PurchaseError::InsufficientStock { .. } => "PURCHASE_OUT_OF_STOCK",
            PurchaseError::Conflict => "CONCURRENCY_CONFLICT",
            PurchaseError::SystemFailure(_) => "SYSTEM_PURCHASE_FAILURE",
        }
    }

    /// Whether resubmitting the same request with the same key can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PurchaseError::Conflict | PurchaseError::SystemFailure(_))
    }
}

/// Buys `quantity` units of a product exactly once per idempotency key.
pub async fn purchase(
    state: &AppState,
    cmd: PurchaseCommand,
) -> Result<PurchaseReceipt, PurchaseError> {
    cmd.validate()?;

    let intent = guard::check(&state.orm, &cmd.idempotency_key)
        .await
        .map_err(|err| system_failure(&cmd, "idempotency lookup failed", &err))?;
    if let Intent::AlreadyProcessed(order) = intent {
        return Ok(replay(&cmd, &order));
    }

    let attempt = tokio::time::timeout(
        state.config.purchase_timeout(),
        conflict::run_attempt(&state.orm, &cmd),
    )
    .await;
    // Dropping the timed-out attempt drops its transaction, which rolls back
    // unless the commit already went through.
    let Ok(outcome) = attempt else {
        tracing::error!(
            product_id = cmd.product_id,
            idempotency_key = %cmd.idempotency_key,
            timeout_ms = state.config.purchase_timeout_ms,
            "purchase attempt timed out"
        );
        return match committed_order(state, &cmd).await? {
            Some(order) => Ok(replay(&cmd, &order)),
            None => Err(PurchaseError::SystemFailure(
                "the purchase timed out, retry with the same idempotency key".into(),
            )),
        };
    };

    match outcome {
        Ok(committed) => Ok(commit_receipt(state, &cmd, committed).await),
        Err(AbortReason::DuplicateIntent) => {
            // Lost the insert race to a transaction carrying the same key.
            match committed_order(state, &cmd).await? {
                Some(order) => Ok(replay(&cmd, &order)),
                None => Err(system_failure(
                    &cmd,
                    "duplicate key reported but no order found",
                    &"missing order",
                )),
            }
        }
        Err(AbortReason::NotFound) => {
            tracing::warn!(product_id = cmd.product_id, "purchase of unknown product");
            Err(PurchaseError::NotFound(cmd.product_id))
        }
        Err(AbortReason::Inactive) => {
            tracing::warn!(product_id = cmd.product_id, "purchase of inactive product");
            Err(PurchaseError::Inactive(cmd.product_id))
        }
        Err(AbortReason::InsufficientStock { requested, available }) => {
            tracing::warn!(
                product_id = cmd.product_id,
                requested,
                available,
                "stock-out"
            );
            Err(PurchaseError::InsufficientStock { requested, available })
        }
        Err(AbortReason::Conflict) => {
            // The write that beat us may be a duplicate of this very request.
            if let Some(order) = committed_order(state, &cmd).await? {
                return Ok(replay(&cmd, &order));
            }
            tracing::warn!(
                product_id = cmd.product_id,
                idempotency_key = %cmd.idempotency_key,
                "version conflict, attempt rolled back"
            );
            Err(PurchaseError::Conflict)
        }
        Err(AbortReason::Store(err)) => Err(system_failure(&cmd, "purchase transaction failed", &err)),
    }
}

async fn commit_receipt(state: &AppState, cmd: &PurchaseCommand, committed: Committed) -> PurchaseReceipt {
    let Committed { order, new_stock } = committed;
    tracing::info!(
        order_id = order.id,
        product_id = order.product_id,
        quantity = order.quantity,
        total_price = %order.total_price,
        remaining_stock = new_stock,
        "purchase committed"
    );

    if let Err(err) = log_audit(
        &state.orm,
        Uuid::parse_str(&cmd.buyer_id).ok(),
        "purchase",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "product_id": order.product_id,
            "quantity": order.quantity,
            "idempotency_key": order.idempotency_key,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    PurchaseReceipt::from_order(&order, false)
}

/// Reads the order committed under the command's key, if any. Used after an
/// aborted or timed-out attempt, never to retry one.
async fn committed_order(
    state: &AppState,
    cmd: &PurchaseCommand,
) -> Result<Option<OrderModel>, PurchaseError> {
    ledger::find_order_by_key(&state.orm, &cmd.idempotency_key)
        .await
        .map_err(|err| system_failure(cmd, "idempotency re-query failed", &err))
}

fn replay(cmd: &PurchaseCommand, order: &OrderModel) -> PurchaseReceipt {
    if order.product_id != cmd.product_id || order.quantity != cmd.quantity {
        tracing::warn!(
            idempotency_key = %cmd.idempotency_key,
            order_id = order.id,
            "idempotency key reused with a different request; returning the original order"
        );
    } else {
        tracing::info!(
            idempotency_key = %cmd.idempotency_key,
            order_id = order.id,
            "idempotent replay"
        );
    }
    PurchaseReceipt::from_order(order, true)
}

fn system_failure(
    cmd: &PurchaseCommand,
    context: &str,
    err: &dyn std::fmt::Display,
) -> PurchaseError {
    tracing::error!(
        error = %err,
        product_id = cmd.product_id,
        buyer_id = %cmd.buyer_id,
        "{context}"
    );
    PurchaseError::SystemFailure(context.to_string())
}
