//! Application configuration from environment variables.
//!
//! Load configuration using `Config::from_env()` after calling `dotenvy::dotenv()`.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::core::auth::{TokenConfig, TokenError};
use crate::core::db::pool::redact_url;
use crate::core::db::{DbConfig, DbError};
use crate::core::parse::parse_duration;
use crate::core::session_store::DEFAULT_OP_TIMEOUT;

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Default interval between purges of expired session records
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// HTTP server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Mark auth cookies `Secure`
    pub cookie_secure: bool,
}

/// Session store settings
#[derive(Clone)]
pub struct StoreConfig {
    /// Redis connection URL
    /// Example: redis://localhost:6379
    /// Without it the session cache stays in process memory.
    pub redis_url: Option<String>,
    /// Deadline for each cache or database call
    pub op_timeout: Duration,
    pub purge_interval: Duration,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("redis_url", &self.redis_url.as_deref().map(redact_url))
            .field("op_timeout", &self.op_timeout)
            .field("purge_interval", &self.purge_interval)
            .finish()
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub tokens: TokenConfig,
    pub db: DbConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Call `dotenvy::dotenv()` before this to load from `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_lookup(&lookup)?,
            store: StoreConfig::from_lookup(&lookup)?,
            tokens: TokenConfig::from_lookup(&lookup)?,
            db: DbConfig::from_lookup(&lookup)?,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            cookie_secure: true,
        }
    }
}

impl ServerConfig {
    /// Reads `BIND_ADDR` and `COOKIE_SECURE`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw.trim().parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
                name: "BIND_ADDR",
                value: raw,
            })?,
            None => defaults.bind_addr,
        };

        let cookie_secure = match lookup("COOKIE_SECURE") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                name: "COOKIE_SECURE",
                value: raw,
            })?,
            None => defaults.cookie_secure,
        };

        Ok(Self {
            bind_addr,
            cookie_secure,
        })
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            op_timeout: DEFAULT_OP_TIMEOUT,
            purge_interval: DEFAULT_PURGE_INTERVAL,
        }
    }
}

impl StoreConfig {
    /// Reads `REDIS_URL`, `STORE_OP_TIMEOUT` and `SESSION_PURGE_INTERVAL`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let duration = |name: &'static str, default: Duration| match lookup(name) {
            Some(raw) => parse_duration(&raw)
                .filter(|d| !d.is_zero())
                .ok_or(ConfigError::Invalid { name, value: raw }),
            None => Ok(default),
        };

        Ok(Self {
            redis_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
            op_timeout: duration("STORE_OP_TIMEOUT", defaults.op_timeout)?,
            purge_interval: duration("SESSION_PURGE_INTERVAL", defaults.purge_interval)?,
        })
    }

    /// Check if Redis is configured
    pub fn has_redis(&self) -> bool {
        self.redis_url.is_some()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
