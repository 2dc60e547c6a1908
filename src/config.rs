use std::{env, time::Duration};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub purchase_timeout_ms: u64,
    pub concurrency_limit: usize,
    pub db_max_connections: u32,
    pub initial_admin: Option<AdminSeed>,
}

impl AppConfig {
    /// Defaults for everything except the two required settings.
    pub fn new(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: "127.0.0.1".to_string(),
            port: 3000,
            jwt_secret: jwt_secret.into(),
            jwt_ttl_hours: 3,
            purchase_timeout_ms: 5_000,
            concurrency_limit: 100,
            db_max_connections: 20,
            initial_admin: None,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let mut config = Self::new(database_url, jwt_secret);

        if let Ok(host) = env::var("APP_HOST") {
            config.host = host;
        }
        config.port = parse_var("APP_PORT").unwrap_or(config.port);
        config.jwt_ttl_hours = parse_var("JWT_TTL_HOURS").unwrap_or(config.jwt_ttl_hours);
        config.purchase_timeout_ms =
            parse_var("PURCHASE_TIMEOUT_MS").unwrap_or(config.purchase_timeout_ms);
        config.concurrency_limit =
            parse_var("APP_CONCURRENCY_LIMIT").unwrap_or(config.concurrency_limit);
        config.db_max_connections =
            parse_var("DB_MAX_CONNECTIONS").unwrap_or(config.db_max_connections);

        config.initial_admin = match (
            env::var("INITIAL_ADMIN_USERNAME"),
            env::var("INITIAL_ADMIN_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) if !username.is_empty() && !password.is_empty() => {
                Some(AdminSeed { username, password })
            }
            _ => None,
        };

        Ok(config)
    }

    pub fn purchase_timeout(&self) -> Duration {
        Duration::from_millis(self.purchase_timeout_ms)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
