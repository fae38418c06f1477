//! Application configuration

use std::env;
use std::str::FromStr;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub log_json: bool,

    // Database (absent selects in-memory stores)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Broker (absent selects the in-process queue)
    pub redis_url: Option<String>,
    pub notification_channel: String,
    pub broker_backoff_base_ms: u64,
    pub broker_backoff_max_ms: u64,

    // Authentication
    pub staff_jwt_secret: String,

    // Limits
    pub message_max_length: usize,
    pub history_page_limit_max: u32,
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let staff_jwt_secret =
            env::var("STAFF_JWT_SECRET").map_err(|_| ConfigError::Missing("STAFF_JWT_SECRET"))?;
        if staff_jwt_secret.len() < 32 {
            return Err(ConfigError::WeakSecret(
                "STAFF_JWT_SECRET must be at least 32 characters",
            ));
        }

        let broker_backoff_base_ms = parsed_or("BROKER_BACKOFF_BASE_MS", 500u64);
        let broker_backoff_max_ms = parsed_or("BROKER_BACKOFF_MAX_MS", 30_000u64);
        if broker_backoff_base_ms == 0 || broker_backoff_max_ms < broker_backoff_base_ms {
            return Err(ConfigError::Invalid(
                "BROKER_BACKOFF_MAX_MS must be >= BROKER_BACKOFF_BASE_MS > 0",
            ));
        }

        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),

            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            database_max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 20),

            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            notification_channel: env::var("NOTIFICATION_CHANNEL")
                .unwrap_or_else(|_| "staff-notifications".to_string()),
            broker_backoff_base_ms,
            broker_backoff_max_ms,

            staff_jwt_secret,

            message_max_length: parsed_or("MESSAGE_MAX_LENGTH", 5000),
            history_page_limit_max: parsed_or("HISTORY_PAGE_LIMIT_MAX", 100),
        })
    }

    /// In-memory configuration with defaults, for local runs and tests
    pub fn local(staff_jwt_secret: &str) -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            log_json: false,
            database_url: None,
            database_max_connections: 20,
            redis_url: None,
            notification_channel: "staff-notifications".to_string(),
            broker_backoff_base_ms: 500,
            broker_backoff_max_ms: 30_000,
            staff_jwt_secret: staff_jwt_secret.to_string(),
            message_max_length: 5000,
            history_page_limit_max: 100,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
