use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use flash_sale_engine::{
    config::AppConfig,
    db::{OrmConn, create_orm_conn, run_migrations},
    entity::{
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
        users::{Column as UserCol, Entity as Users},
    },
    models::Role,
    services::auth_service::{create_account, normalize_username},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url, config.db_max_connections).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let (admin_name, admin_password) = match &config.initial_admin {
        Some(seed) => (seed.username.clone(), seed.password.clone()),
        None => ("admin".to_string(), "admin123".to_string()),
    };
    let admin_id = ensure_user(&orm, &admin_name, &admin_password, Role::Admin).await?;
    let user_id = ensure_user(&orm, "buyer", "buyer123", Role::User).await?;
    seed_products(&orm).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    orm: &OrmConn,
    username: &str,
    password: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    let existing = Users::find()
        .filter(UserCol::UsernameKey.eq(normalize_username(username)))
        .one(orm)
        .await?;

    // If user already exists, keep it as is
    let user_id = match existing {
        Some(user) => user.id,
        None => create_account(orm, username, password, role).await?.id,
    };

    println!("Ensured user {username} (role={role})");
    Ok(user_id)
}

async fn seed_products(orm: &OrmConn) -> anyhow::Result<()> {
    let products = [
        (
            "Limited Edition Sneakers",
            "Only ten pairs, one drop",
            Decimal::new(9999, 2),
            10,
        ),
        ("Ferris Plush", "Soft crab for your desk", Decimal::new(2450, 2), 50),
        ("Async Rust Hoodie", "Warm and non-blocking", Decimal::new(5500, 2), 25),
        ("Collector Pin Set", "Numbered enamel pins", Decimal::new(1200, 2), 3),
    ];

    for (name, description, price, stock) in products {
        let exists = Products::find()
            .filter(ProdCol::Name.eq(name))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }

        let now = Utc::now();
        ProductActive {
            id: NotSet,
            name: Set(name.to_string()),
            description: Set(description.to_string()),
            image_url: Set(String::new()),
            price: Set(price),
            stock_count: Set(stock),
            is_active: Set(true),
            version: Set(1),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(orm)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
