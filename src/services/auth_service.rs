use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, Set, SqlErr};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    config::AdminSeed,
    db::OrmConn,
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Role, User},
    response::{ApiResponse, Meta},
    state::AppState,
};

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 50;
const MIN_PASSWORD_LEN: usize = 6;

/// Public sign-up. Always creates a plain `user`.
pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let user = create_account(&state.orm, &payload.username, &payload.password, Role::User).await?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.id),
        "user_register",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }
    Ok(ApiResponse::success("User registered successfully", User::from(user), None))
}

/// The only path that can mint another admin.
pub async fn create_admin(
    state: &AppState,
    caller: &AuthUser,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(caller)?;
    let user = create_account(&state.orm, &payload.username, &payload.password, Role::Admin).await?;
    tracing::info!(created_by = %caller.user_id, admin_id = %user.id, "admin account created");

    if let Err(err) = log_audit(
        &state.orm,
        Some(caller.user_id),
        "admin_create",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }
    Ok(ApiResponse::success(
        "New Admin created successfully",
        User::from(user),
        Some(Meta::empty()),
    ))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { username, password } = payload;
    let user = Users::find()
        .filter(UserCol::UsernameKey.eq(normalize_username(&username)))
        .one(&state.orm)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(invalid_credentials(&username)),
    };
    if !verify_password(&password, &user.password_hash)? {
        return Err(invalid_credentials(&username));
    }

    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(state.config.jwt_ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role.clone(),
        exp: expiration.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    if let Err(err) = log_audit(
        &state.orm,
        Some(user.id),
        "user_login",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            token: format!("Bearer {}", token),
        },
        Some(Meta::empty()),
    ))
}

/// Creates the configured admin when no admin exists yet.
pub async fn seed_initial_admin(orm: &OrmConn, seed: &AdminSeed) -> AppResult<Option<Uuid>> {
    let existing = Users::find()
        .filter(UserCol::Role.eq(Role::Admin.as_str()))
        .one(orm)
        .await?;
    if existing.is_some() {
        return Ok(None);
    }
    let admin = create_account(orm, &seed.username, &seed.password, Role::Admin).await?;
    tracing::info!(admin_id = %admin.id, username = %admin.username, "initial admin seeded");
    Ok(Some(admin.id))
}

pub async fn create_account(
    orm: &OrmConn,
    username: &str,
    password: &str,
    role: Role,
) -> AppResult<UserModel> {
    let username = username.trim();
    let name_len = username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&name_len) {
        return Err(AppError::BadRequest(format!(
            "username must be between {MIN_USERNAME_LEN} and {MAX_USERNAME_LEN} characters"
        )));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let username_key = normalize_username(username);
    let taken = Users::find()
        .filter(UserCol::UsernameKey.eq(username_key.as_str()))
        .one(orm)
        .await?;
    if taken.is_some() {
        return Err(username_taken());
    }

    let password_hash = hash_password(password)?;
    UserActive {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_owned()),
        username_key: Set(username_key),
        password_hash: Set(password_hash),
        role: Set(role.as_str().to_owned()),
        created_at: Set(Utc::now().into()),
    }
    .insert(orm)
    .await
    .map_err(|err: DbErr| match err.sql_err() {
        // Lost a race with a concurrent registration of the same name.
        Some(SqlErr::UniqueConstraintViolation(_)) => username_taken(),
        _ => AppError::OrmError(err),
    })
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

fn invalid_credentials(username: &str) -> AppError {
    tracing::warn!(username = %username, "failed login attempt");
    AppError::Unauthorized("Invalid username or password".into())
}

fn username_taken() -> AppError {
    AppError::Conflict("Username is already taken.".into())
}
