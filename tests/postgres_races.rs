mod common;

use common::{buy, create_product, create_user, stock_of};
use flash_sale_engine::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::orders::{Column as OrderCol, Entity as Orders},
    models::Role,
    services::purchase::PurchaseError,
    state::AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tokio::sync::OnceCell;
use uuid::Uuid;

// Tests in this file share one database; the first one to get here migrates it.
static MIGRATED: OnceCell<()> = OnceCell::const_new();

// These races need real concurrent connections, so they run against Postgres.
// Rows are namespaced by fresh uuids; nothing is truncated between runs.
async fn setup_pg_state() -> anyhow::Result<Option<AppState>> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) if url.starts_with("postgres") => url,
        _ => {
            eprintln!("Skipping test: set TEST_DATABASE_URL or DATABASE_URL to a Postgres URL.");
            return Ok(None);
        }
    };

    let orm = create_orm_conn(&database_url, 16).await?;
    MIGRATED.get_or_try_init(|| run_migrations(&orm)).await?;

    let mut config = AppConfig::new(database_url, common::TEST_SECRET);
    config.purchase_timeout_ms = 30_000;
    Ok(Some(AppState::new(orm, config)))
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

async fn orders_for_product(state: &AppState, product_id: i32) -> anyhow::Result<u64> {
    Ok(Orders::find()
        .filter(OrderCol::ProductId.eq(product_id))
        .count(&state.orm)
        .await?)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn same_key_requests_all_succeed_with_one_order() -> anyhow::Result<()> {
    let Some(state) = setup_pg_state().await? else {
        return Ok(());
    };
    let buyer = create_user(&state, &unique("buyer"), Role::User).await?;
    let product =
        create_product(&state, &unique("Sneakers"), Decimal::new(1250, 2), 100, true).await?;

    let product_id = product.id;
    for round in 1..=10 {
        let key = unique("double-click");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let state = state.clone();
            let buyer = buyer.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                buy(&state, &buyer, product_id, 1, &key).await
            }));
        }

        let mut receipts = Vec::new();
        for handle in handles {
            receipts.push(handle.await??);
        }

        let order_id = receipts[0].order_id;
        assert!(receipts.iter().all(|r| r.order_id == order_id));
        assert_eq!(receipts.iter().filter(|r| !r.replayed).count(), 1);
        assert_eq!(stock_of(&state, product.id).await?, 100 - round);
        assert_eq!(orders_for_product(&state, product.id).await?, round as u64);
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn last_unit_race_never_oversells() -> anyhow::Result<()> {
    let Some(state) = setup_pg_state().await? else {
        return Ok(());
    };
    let product =
        create_product(&state, &unique("Last Pair"), Decimal::new(9900, 2), 1, true).await?;

    let product_id = product.id;
    let mut handles = Vec::new();
    for i in 0..8 {
        let state = state.clone();
        let buyer = create_user(&state, &unique(&format!("buyer{i}")), Role::User).await?;
        handles.push(tokio::spawn(async move {
            buy(&state, &buyer, product_id, 1, &unique("last")).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await? {
            Ok(receipt) => {
                assert!(!receipt.replayed);
                winners += 1;
            }
            Err(PurchaseError::InsufficientStock { .. }) | Err(PurchaseError::Conflict) => {}
            Err(other) => panic!("unexpected purchase error: {other}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(stock_of(&state, product.id).await?, 0);
    assert_eq!(orders_for_product(&state, product.id).await?, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn burst_of_buyers_never_oversells() -> anyhow::Result<()> {
    let Some(state) = setup_pg_state().await? else {
        return Ok(());
    };
    let buyer = create_user(&state, &unique("buyer"), Role::User).await?;
    let initial = 5;
    let product =
        create_product(&state, &unique("Drop"), Decimal::new(500, 2), initial, true).await?;

    let product_id = product.id;
    let mut handles = Vec::new();
    for _ in 0..40 {
        let state = state.clone();
        let buyer = buyer.clone();
        handles.push(tokio::spawn(async move {
            buy(&state, &buyer, product_id, 1, &unique("burst")).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => successes += 1,
            Err(PurchaseError::InsufficientStock { .. }) | Err(PurchaseError::Conflict) => {}
            Err(other) => panic!("unexpected purchase error: {other}"),
        }
    }

    let remaining = stock_of(&state, product.id).await?;
    assert!(successes >= 1);
    assert!(successes <= initial);
    assert_eq!(remaining, initial - successes);
    assert_eq!(orders_for_product(&state, product.id).await?, successes as u64);
    Ok(())
}
