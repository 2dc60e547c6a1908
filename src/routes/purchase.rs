use axum::{Json, Router, extract::State, http::StatusCode, routing::post};

use crate::{
    dto::orders::PurchaseRequest,
    error::AppResult,
    middleware::{auth::AuthUser, headers::IdempotencyKey},
    response::{ApiResponse, Meta},
    services::purchase::{self, PurchaseCommand, PurchaseReceipt},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(purchase_product))
}

#[utoipa::path(
    post,
    path = "/api/purchase",
    params(
        ("X-Idempotency-Key" = String, Header, description = "Client-chosen key, at most 100 characters; resubmit the same key to retry safely")
    ),
    request_body = PurchaseRequest,
    responses(
        (status = 201, description = "Order placed", body = ApiResponse<PurchaseReceipt>),
        (status = 200, description = "Order already placed with this key", body = ApiResponse<PurchaseReceipt>),
        (status = 400, description = "Invalid request or inactive product"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Concurrent modification, safe to retry"),
        (status = 410, description = "Out of stock"),
        (status = 500, description = "Purchase failed, safe to retry with the same key")
    ),
    security(("bearer_auth" = [])),
    tag = "Purchase"
)]
pub async fn purchase_product(
    State(state): State<AppState>,
    user: AuthUser,
    IdempotencyKey(idempotency_key): IdempotencyKey,
    Json(payload): Json<PurchaseRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<PurchaseReceipt>>)> {
    let cmd = PurchaseCommand {
        product_id: payload.product_id,
        quantity: payload.quantity,
        buyer_id: user.buyer_id(),
        idempotency_key,
    };
    let receipt = purchase::purchase(&state, cmd).await?;

    let (status, message) = if receipt.replayed {
        (StatusCode::OK, "Order already placed.")
    } else {
        (StatusCode::CREATED, "Order placed successfully!")
    };
    Ok((
        status,
        Json(ApiResponse::success(message, receipt, Some(Meta::empty()))),
    ))
}
