//! Server configuration loaded from environment variables.
//!
//! Values come from the process environment, optionally seeded from a
//! `.env` file via `dotenvy`.

use std::net::SocketAddr;
use std::time::Duration;

/// Top-level application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP/WebSocket server binds to
    pub listen_addr: SocketAddr,
    /// PostgreSQL connection string; in-memory repositories are used when unset
    pub database_url: Option<String>,
    /// HMAC secret used to sign session tokens
    pub jwt_secret: String,
    /// Lifetime of an issued session
    pub session_ttl_hours: i64,
    /// Upper bound on the best-effort POS notification after a settlement
    pub pos_sync_timeout: Duration,
    /// Shared secret expected in the `x-webhook-secret` header of payment callbacks
    pub webhook_secret: Option<String>,
}

impl AppConfig {
    /// Loads configuration from the environment, falling back to defaults.
    ///
    /// Fails only when `LISTEN_ADDR` is set but is not a valid socket address.
    pub fn from_env() -> Result<Self, std::net::AddrParseError> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let jwt_secret = std::env::var("JWT_SECRET")
            .unwrap_or_else(|_| "your-secret-key-change-in-production".to_string());

        let webhook_secret = std::env::var("WEBHOOK_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty());

        Ok(Self {
            listen_addr,
            database_url,
            jwt_secret,
            session_ttl_hours: parse_env("SESSION_TTL_HOURS", 12),
            pos_sync_timeout: Duration::from_millis(parse_env("POS_SYNC_TIMEOUT_MS", 5_000)),
            webhook_secret,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            jwt_secret: "your-secret-key-change-in-production".to_string(),
            session_ttl_hours: 12,
            pos_sync_timeout: Duration::from_millis(5_000),
            webhook_secret: None,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` when it is
/// missing or unparsable.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
