use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{error::AppError, services::purchase::PurchaseError};

pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

/// Raw `X-Idempotency-Key` value. Missing or blank keys are passed through
/// empty so the purchase core rejects them with its own taxonomy; unreadable
/// ones are rejected here with the same `INVALID_PURCHASE_REQUEST` code.
#[derive(Debug, Clone)]
pub struct IdempotencyKey(pub String);

impl<S> FromRequestParts<S> for IdempotencyKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = match parts.headers.get(IDEMPOTENCY_KEY_HEADER) {
            Some(value) => value
                .to_str()
                .map_err(|_| {
                    PurchaseError::InvalidInput("X-Idempotency-Key must be visible ASCII".into())
                })?
                .to_owned(),
            None => String::new(),
        };
        Ok(IdempotencyKey(key))
    }
}

/// Version token from `If-Match`, accepting `3`, `"3"` and `W/"3"`.
#[derive(Debug, Clone, Copy)]
pub struct IfMatch(pub Option<i64>);

impl IfMatch {
    pub fn required(self) -> Result<i64, AppError> {
        self.0
            .ok_or_else(|| AppError::BadRequest("If-Match header with the product version is required".into()))
    }
}

impl<S> FromRequestParts<S> for IfMatch
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(axum::http::header::IF_MATCH) else {
            return Ok(IfMatch(None));
        };
        let raw = value
            .to_str()
            .map_err(|_| AppError::BadRequest("Invalid If-Match header".into()))?;
        parse_version(raw)
            .map(|v| IfMatch(Some(v)))
            .ok_or_else(|| AppError::BadRequest("If-Match must carry a numeric version".into()))
    }
}

pub fn parse_version(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("W/").unwrap_or(raw);
    raw.trim_matches('"').parse::<i64>().ok()
}
