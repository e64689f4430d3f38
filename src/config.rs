//! Configuration types, built from environment variables.

use std::path::PathBuf;

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Port for the HTTP server (webhook + admin API).
    pub port: u16,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Root directory for saved email attachments.
    pub attachment_dir: PathBuf,
    /// Domain that receives inbound replies (`order-<slug>@<domain>`).
    pub inbound_domain: String,
    /// SMTP configuration. `None` disables outbound delivery.
    pub smtp: Option<SmtpConfig>,
}

impl AppConfig {
    /// Build config from environment variables, with defaults for local dev.
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("ORDER_DESK_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        let db_path = std::env::var("ORDER_DESK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/order-desk.db"));

        let attachment_dir = std::env::var("ORDER_DESK_ATTACHMENT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/attachments"));

        let inbound_domain = std::env::var("ORDER_DESK_INBOUND_DOMAIN")
            .unwrap_or_else(|_| "orders.localhost".to_string());

        Self {
            port,
            db_path,
            attachment_dir,
            inbound_domain,
            smtp: SmtpConfig::from_env(),
        }
    }
}

/// SMTP configuration for outbound mail.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMTP_HOST` is not set (outbound delivery disabled).
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;

        let port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("SMTP_PASSWORD").unwrap_or_default();
        let from_address = std::env::var("SMTP_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        })
    }
}
