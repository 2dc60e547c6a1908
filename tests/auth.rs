mod common;

use axum::{
    extract::FromRequestParts,
    http::{Request, header},
};
use common::{create_user, setup_state};
use flash_sale_engine::{
    config::AdminSeed,
    dto::auth::{LoginRequest, RegisterRequest},
    error::AppError,
    middleware::auth::AuthUser,
    models::Role,
    services::auth_service,
    state::AppState,
};

fn register(username: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        password: password.to_string(),
    }
}

async fn extract(state: &AppState, authorization: &str) -> Result<AuthUser, AppError> {
    let (mut parts, _) = Request::builder()
        .header(header::AUTHORIZATION, authorization)
        .body(())
        .unwrap()
        .into_parts();
    AuthUser::from_request_parts(&mut parts, state).await
}

#[tokio::test]
async fn registration_creates_plain_users_with_unique_names() -> anyhow::Result<()> {
    let state = setup_state().await?;

    let user = auth_service::register_user(&state, register("Alice", "secret1"))
        .await?
        .data
        .unwrap();
    assert_eq!(user.username, "Alice");
    assert_eq!(user.role, Role::User);

    let duplicate = auth_service::register_user(&state, register("alice", "secret2"))
        .await
        .unwrap_err();
    assert!(matches!(duplicate, AppError::Conflict(_)));

    let short_name = auth_service::register_user(&state, register("al", "secret1"))
        .await
        .unwrap_err();
    assert!(matches!(short_name, AppError::BadRequest(_)));

    let short_password = auth_service::register_user(&state, register("bob", "12345"))
        .await
        .unwrap_err();
    assert!(matches!(short_password, AppError::BadRequest(_)));
    Ok(())
}

#[tokio::test]
async fn login_issues_a_token_the_extractor_accepts() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let registered = auth_service::register_user(&state, register("Buyer", "secret1"))
        .await?
        .data
        .unwrap();

    let token = auth_service::login_user(
        &state,
        LoginRequest {
            username: "buyer".into(),
            password: "secret1".into(),
        },
    )
    .await?
    .data
    .unwrap()
    .token;
    assert!(token.starts_with("Bearer "));

    let user = extract(&state, &token).await?;
    assert_eq!(user.user_id, registered.id);
    assert_eq!(user.role, Role::User);
    assert_eq!(user.buyer_id(), registered.id.to_string());

    let wrong = auth_service::login_user(
        &state,
        LoginRequest {
            username: "buyer".into(),
            password: "not-it".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(wrong, AppError::Unauthorized(_)));

    let unknown = auth_service::login_user(
        &state,
        LoginRequest {
            username: "nobody".into(),
            password: "secret1".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(unknown, AppError::Unauthorized(_)));
    Ok(())
}

#[tokio::test]
async fn extractor_rejects_bad_tokens() -> anyhow::Result<()> {
    let state = setup_state().await?;

    let garbage = extract(&state, "Bearer not-a-jwt").await.unwrap_err();
    assert!(matches!(garbage, AppError::Unauthorized(_)));

    let scheme = extract(&state, "Basic abc").await.unwrap_err();
    assert!(matches!(scheme, AppError::Unauthorized(_)));

    let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
    let missing = AuthUser::from_request_parts(&mut parts, &state).await.unwrap_err();
    assert!(matches!(missing, AppError::Unauthorized(_)));

    Ok(())
}

#[tokio::test]
async fn only_admins_create_admins() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let admin = create_user(&state, "root", Role::Admin).await?;
    let user = create_user(&state, "plain", Role::User).await?;

    let denied = auth_service::create_admin(&state, &user, register("sneaky", "secret1"))
        .await
        .unwrap_err();
    assert!(matches!(denied, AppError::Forbidden));

    let created = auth_service::create_admin(&state, &admin, register("deputy", "secret1"))
        .await?
        .data
        .unwrap();
    assert_eq!(created.role, Role::Admin);
    Ok(())
}

#[tokio::test]
async fn initial_admin_is_seeded_once() -> anyhow::Result<()> {
    let state = setup_state().await?;
    let seed = AdminSeed {
        username: "owner".into(),
        password: "owner-pass".into(),
    };

    let first = auth_service::seed_initial_admin(&state.orm, &seed).await?;
    assert!(first.is_some());

    let second = auth_service::seed_initial_admin(&state.orm, &seed).await?;
    assert!(second.is_none());
    Ok(())
}
