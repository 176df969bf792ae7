//! Configuration module for the Roster backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// HMAC secret for signing JWTs
    pub jwt_secret: String,
    /// Access token lifetime in minutes
    pub jwt_ttl_minutes: i64,
    /// Pre-shared key guarding the admin bootstrap endpoint (disabled when unset)
    pub setup_key: Option<String>,
    /// Where admin notifications go
    pub admin_email: String,
    /// Sender address for outgoing mail
    pub mail_from: String,
    /// HTTP mail relay endpoint; notifications are logged only when unset
    pub mail_relay_url: Option<String>,
    /// Bearer token for the mail relay
    pub mail_relay_token: Option<String>,
    /// Public base URL used in email links
    pub base_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let db_path = env::var("ROSTER_DB_PATH")
            .unwrap_or_else(|_| "./data/roster.sqlite".to_string())
            .into();

        let bind_addr = env::var("ROSTER_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid ROSTER_BIND_ADDR format");

        let log_level = env::var("ROSTER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let jwt_secret =
            env::var("ROSTER_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".to_string());

        let jwt_ttl_minutes = env::var("ROSTER_JWT_TTL_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let setup_key = env::var("ROSTER_SETUP_KEY").ok();

        let admin_email =
            env::var("ROSTER_ADMIN_EMAIL").unwrap_or_else(|_| "admin@roster.test".to_string());

        let mail_from =
            env::var("ROSTER_MAIL_FROM").unwrap_or_else(|_| "no-reply@roster.test".to_string());

        let mail_relay_url = env::var("ROSTER_MAIL_RELAY_URL").ok();
        let mail_relay_token = env::var("ROSTER_MAIL_RELAY_TOKEN").ok();

        let base_url =
            env::var("ROSTER_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());

        Self {
            db_path,
            bind_addr,
            log_level,
            jwt_secret,
            jwt_ttl_minutes,
            setup_key,
            admin_email,
            mail_from,
            mail_relay_url,
            mail_relay_token,
            base_url,
        }
    }
}
