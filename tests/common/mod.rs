#![allow(dead_code)]

use std::time::Duration;

use chrono::Utc;
use flash_sale_engine::{
    config::AppConfig,
    db::run_migrations,
    entity::{
        orders::Entity as Orders,
        products::{ActiveModel as ProductActive, Model as ProductModel},
        users::ActiveModel as UserActive,
    },
    ledger,
    middleware::auth::AuthUser,
    models::Role,
    services::purchase::{self, PurchaseCommand, PurchaseError, PurchaseReceipt},
    state::AppState,
};
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, EntityTrait, PaginatorTrait, Set};
use uuid::Uuid;

pub const TEST_SECRET: &str = "test-secret";

/// Fresh in-memory database per test. One pooled connection keeps every
/// query on the same SQLite memory database.
pub async fn setup_state() -> anyhow::Result<AppState> {
    let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
    options
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(Duration::from_secs(3600))
        .sqlx_logging(false);
    let orm = Database::connect(options).await?;
    run_migrations(&orm).await?;

    let mut config = AppConfig::new("sqlite::memory:", TEST_SECRET);
    // Concurrent tests queue on the single connection.
    config.purchase_timeout_ms = 30_000;
    Ok(AppState::new(orm, config))
}

pub async fn create_user(state: &AppState, username: &str, role: Role) -> anyhow::Result<AuthUser> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        username_key: Set(username.to_lowercase()),
        password_hash: Set("dummy".into()),
        role: Set(role.as_str().into()),
        created_at: Set(Utc::now().into()),
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        role,
    })
}

pub async fn create_product(
    state: &AppState,
    name: &str,
    price: Decimal,
    stock: i32,
    is_active: bool,
) -> anyhow::Result<ProductModel> {
    let now = Utc::now();
    let product = ProductActive {
        id: NotSet,
        name: Set(name.to_string()),
        description: Set(format!("{name} for testing")),
        image_url: Set(String::new()),
        price: Set(price),
        stock_count: Set(stock),
        is_active: Set(is_active),
        version: Set(1),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;
    Ok(product)
}

pub fn command(buyer: &AuthUser, product_id: i32, quantity: i32, key: &str) -> PurchaseCommand {
    PurchaseCommand {
        product_id,
        quantity,
        buyer_id: buyer.buyer_id(),
        idempotency_key: key.to_string(),
    }
}

pub async fn buy(
    state: &AppState,
    buyer: &AuthUser,
    product_id: i32,
    quantity: i32,
    key: &str,
) -> Result<PurchaseReceipt, PurchaseError> {
    purchase::purchase(state, command(buyer, product_id, quantity, key)).await
}

pub async fn stock_of(state: &AppState, product_id: i32) -> anyhow::Result<i32> {
    let product = ledger::find_product(&state.orm, product_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product {product_id} missing"))?;
    Ok(product.stock_count)
}

pub async fn order_count(state: &AppState) -> anyhow::Result<u64> {
    Ok(Orders::find().count(&state.orm).await?)
}
