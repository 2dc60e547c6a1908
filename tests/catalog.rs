mod common;

use common::{buy, create_product, create_user, setup_state, stock_of};
use flash_sale_engine::{
    dto::products::{InventoryAdjustRequest, ProductUpsertRequest},
    error::AppError,
    models::Role,
    routes::params::{OrderListQuery, ProductQuery, ProductSortBy, SortOrder},
    services::{admin_service, order_service, product_service},
};
use rust_decimal::Decimal;

fn upsert(name: &str, price: Decimal, stock_count: i32) -> ProductUpsertRequest {
    ProductUpsertRequest {
        name: name.to_string(),
        description: format!("{name} description"),
        image_url: String::new(),
        price,
        stock_count,
    }
}

#[tokio::test]
async fn create_product_validates_and_starts_at_version_one() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let admin = create_user(&state, "admin", Role::Admin).await?;
    let user = create_user(&state, "buyer", Role::User).await?;

    let forbidden = product_service::create_product(&state, &user, upsert("Mug", Decimal::new(800, 2), 5))
        .await
        .unwrap_err();
    assert!(matches!(forbidden, AppError::Forbidden));

    for bad in [
        upsert("", Decimal::new(800, 2), 5),
        upsert(&"x".repeat(101), Decimal::new(800, 2), 5),
        upsert("Free", Decimal::ZERO, 5),
        upsert("Pricey", Decimal::new(100_000_001, 2), 5),
        upsert("Fraction", Decimal::new(8125, 3), 5),
        upsert("Negative", Decimal::new(800, 2), -1),
        upsert("Huge", Decimal::new(800, 2), 10_001),
    ] {
        let err = product_service::create_product(&state, &admin, bad).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");
    }

    let created = product_service::create_product(&state, &admin, upsert("Mug", Decimal::new(800, 2), 5))
        .await?
        .data
        .unwrap();
    assert_eq!(created.version, 1);
    assert!(created.is_active);

    let fetched = product_service::get_product(&state, created.id).await?.data.unwrap();
    assert_eq!(fetched.name, "Mug");
    assert_eq!(fetched.price, Decimal::new(800, 2));
    assert_eq!(fetched.stock_count, 5);
    Ok(())
}

#[tokio::test]
async fn bulk_create_is_all_or_nothing() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let admin = create_user(&state, "admin", Role::Admin).await?;

    let empty = product_service::create_products_bulk(&state, &admin, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(empty, AppError::BadRequest(_)));

    let mixed = vec![
        upsert("Good", Decimal::new(500, 2), 3),
        upsert("Bad", Decimal::ZERO, 3),
    ];
    let err = product_service::create_products_bulk(&state, &admin, mixed)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(msg) if msg.starts_with("item 1")));

    let listed = product_service::list_products(&state, ProductQuery::default()).await?;
    assert_eq!(listed.meta.unwrap().total, Some(0));

    let created = product_service::create_products_bulk(
        &state,
        &admin,
        vec![
            upsert("Pin", Decimal::new(500, 2), 3),
            upsert("Patch", Decimal::new(750, 2), 4),
        ],
    )
    .await?
    .data
    .unwrap();
    assert_eq!(created.items.len(), 2);
    Ok(())
}

#[tokio::test]
async fn update_requires_current_version() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let admin = create_user(&state, "admin", Role::Admin).await?;
    let buyer = create_user(&state, "buyer", Role::User).await?;
    let product = create_product(&state, "Sneakers", Decimal::new(1250, 2), 10, true).await?;

    // A sale lands after the admin loaded version 1.
    buy(&state, &buyer, product.id, 1, "k-before-edit").await?;

    let stale = product_service::update_product(
        &state,
        &admin,
        product.id,
        product.version,
        upsert("Sneakers v2", Decimal::new(1500, 2), 50),
    )
    .await
    .unwrap_err();
    assert!(matches!(stale, AppError::Conflict(_)));
    assert_eq!(stock_of(&state, product.id).await?, 9);

    let updated = product_service::update_product(
        &state,
        &admin,
        product.id,
        product.version + 1,
        upsert("Sneakers v2", Decimal::new(1500, 2), 50),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(updated.version, product.version + 2);
    assert_eq!(updated.name, "Sneakers v2");
    assert_eq!(updated.price, Decimal::new(1500, 2));
    assert_eq!(updated.stock_count, 50);

    let missing = product_service::update_product(
        &state,
        &admin,
        9999,
        1,
        upsert("Ghost", Decimal::new(100, 2), 1),
    )
    .await
    .unwrap_err();
    assert!(matches!(missing, AppError::NotFound));
    Ok(())
}

#[tokio::test]
async fn soft_delete_hides_product_and_blocks_purchases() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let admin = create_user(&state, "admin", Role::Admin).await?;
    let buyer = create_user(&state, "buyer", Role::User).await?;
    let product = create_product(&state, "Sneakers", Decimal::new(1250, 2), 10, true).await?;

    let stale = product_service::delete_product(&state, &admin, product.id, Some(product.version + 7))
        .await
        .unwrap_err();
    assert!(matches!(stale, AppError::Conflict(_)));

    product_service::delete_product(&state, &admin, product.id, Some(product.version)).await?;

    let hidden = product_service::get_product(&state, product.id).await.unwrap_err();
    assert!(matches!(hidden, AppError::NotFound));
    let listed = product_service::list_products(&state, ProductQuery::default()).await?;
    assert!(listed.data.unwrap().items.is_empty());

    let err = buy(&state, &buyer, product.id, 1, "k-after-delete").await.unwrap_err();
    assert_eq!(err.code(), "PURCHASE_PRODUCT_INACTIVE");
    assert_eq!(stock_of(&state, product.id).await?, 10);

    let missing = product_service::delete_product(&state, &admin, 9999, None)
        .await
        .unwrap_err();
    assert!(matches!(missing, AppError::NotFound));
    Ok(())
}

#[tokio::test]
async fn list_products_filters_sorts_and_pages() -> anyhow::Result<()> {
    let state = setup_state().await?;
    create_product(&state, "Red Sneakers", Decimal::new(5000, 2), 3, true).await?;
    create_product(&state, "Blue Sneakers", Decimal::new(7500, 2), 3, true).await?;
    create_product(&state, "Green Cap", Decimal::new(1500, 2), 3, true).await?;
    create_product(&state, "Hidden Sneakers", Decimal::new(6000, 2), 3, false).await?;

    let search = product_service::list_products(
        &state,
        ProductQuery {
            q: Some("SNEAKERS".into()),
            sort_by: Some(ProductSortBy::Price),
            sort_order: Some(SortOrder::Asc),
            ..Default::default()
        },
    )
    .await?;
    let names: Vec<String> = search.data.unwrap().items.into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Red Sneakers", "Blue Sneakers"]);

    let priced = product_service::list_products(
        &state,
        ProductQuery {
            min_price: Some(Decimal::new(2000, 2)),
            max_price: Some(Decimal::new(6000, 2)),
            ..Default::default()
        },
    )
    .await?;
    let items = priced.data.unwrap().items;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Red Sneakers");

    let paged = product_service::list_products(
        &state,
        ProductQuery {
            page: Some(2),
            per_page: Some(2),
            sort_by: Some(ProductSortBy::Name),
            sort_order: Some(SortOrder::Asc),
            ..Default::default()
        },
    )
    .await?;
    let meta = paged.meta.clone().unwrap();
    assert_eq!(meta.total, Some(3));
    assert_eq!(meta.page, Some(2));
    let items = paged.data.unwrap().items;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Red Sneakers");
    Ok(())
}

#[tokio::test]
async fn adjust_inventory_keeps_stock_in_range() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let admin = create_user(&state, "admin", Role::Admin).await?;
    let user = create_user(&state, "buyer", Role::User).await?;
    let product = create_product(&state, "Sneakers", Decimal::new(1250, 2), 10, true).await?;

    let restocked = admin_service::adjust_inventory(
        &state,
        &admin,
        product.id,
        InventoryAdjustRequest { delta: 5 },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(restocked.stock_count, 15);
    assert_eq!(restocked.version, product.version + 1);

    for delta in [0, -16, 10_000] {
        let err = admin_service::adjust_inventory(
            &state,
            &admin,
            product.id,
            InventoryAdjustRequest { delta },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)), "delta {delta}");
    }

    let forbidden = admin_service::adjust_inventory(
        &state,
        &user,
        product.id,
        InventoryAdjustRequest { delta: 1 },
    )
    .await
    .unwrap_err();
    assert!(matches!(forbidden, AppError::Forbidden));

    let missing = admin_service::adjust_inventory(
        &state,
        &admin,
        9999,
        InventoryAdjustRequest { delta: 1 },
    )
    .await
    .unwrap_err();
    assert!(matches!(missing, AppError::NotFound));

    assert_eq!(stock_of(&state, product.id).await?, 15);
    Ok(())
}

#[tokio::test]
async fn order_history_is_scoped_to_the_buyer() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let admin = create_user(&state, "admin", Role::Admin).await?;
    let alice = create_user(&state, "alice", Role::User).await?;
    let bob = create_user(&state, "bob", Role::User).await?;
    let shoes = create_product(&state, "Sneakers", Decimal::new(1250, 2), 10, true).await?;
    let cap = create_product(&state, "Cap", Decimal::new(500, 2), 10, true).await?;

    let alice_order = buy(&state, &alice, shoes.id, 1, "alice-shoes").await?;
    buy(&state, &alice, cap.id, 2, "alice-cap").await?;
    let bob_order = buy(&state, &bob, shoes.id, 1, "bob-shoes").await?;

    let mine = order_service::list_my_orders(&state, &alice, OrderListQuery::default()).await?;
    assert_eq!(mine.meta.clone().unwrap().total, Some(2));
    assert!(
        mine.data
            .unwrap()
            .items
            .iter()
            .all(|o| o.buyer_id == alice.buyer_id())
    );

    let own = order_service::get_my_order(&state, &alice, alice_order.order_id)
        .await?
        .data
        .unwrap();
    assert_eq!(own.idempotency_key, "alice-shoes");

    let foreign = order_service::get_my_order(&state, &alice, bob_order.order_id)
        .await
        .unwrap_err();
    assert!(matches!(foreign, AppError::NotFound));

    let denied = admin_service::list_all_orders(&state, &alice, OrderListQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(denied, AppError::Forbidden));

    let by_product = admin_service::list_all_orders(
        &state,
        &admin,
        OrderListQuery {
            product_id: Some(shoes.id),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(by_product.meta.clone().unwrap().total, Some(2));
    assert!(
        by_product
            .data
            .unwrap()
            .items
            .iter()
            .all(|o| o.product_id == shoes.id)
    );
    Ok(())
}
