//! Application configuration loaded from environment variables.

/// Process configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default `"0.0.0.0"`)
/// - `PORT` — listen port (default `3000`)
/// - `RUST_LOG` — tracing filter directive (default `"info"`)
/// - `DATABASE_URL` — PostgreSQL URL; absent means the in-memory backend
/// - `WEBHOOK_SIGNING_SECRET` — read through the secret provider, not here
/// - `DEV_UNVERIFIED_WEBHOOKS` — accept unsigned webhooks when no secret
///   is configured (development only; default `false`)
/// - `NOTIFY_SENDER` — sender address on outgoing email
/// - `ABANDONED_CART_TIMEOUT_MINS` — reaper timeout (default `30`)
/// - `REMINDERS_ENABLED` — abandoned-cart reminder flag (default `true`)
/// - `FRONTEND_BASE_URL` — base for customer-facing links
/// - `REAPER_INTERVAL_SECS` — sweep period (default `300`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub allow_unverified_webhooks: bool,
    pub notify_sender: String,
    pub abandoned_cart_timeout_mins: i64,
    pub reminders_enabled: bool,
    pub frontend_base_url: String,
    pub reaper_interval_secs: u64,
}

fn env_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            allow_unverified_webhooks: env_or("DEV_UNVERIFIED_WEBHOOKS", false),
            notify_sender: std::env::var("NOTIFY_SENDER")
                .unwrap_or_else(|_| "orders@example.com".to_string()),
            abandoned_cart_timeout_mins: env_or("ABANDONED_CART_TIMEOUT_MINS", 30),
            reminders_enabled: env_or("REMINDERS_ENABLED", true),
            frontend_base_url: std::env::var("FRONTEND_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            reaper_interval_secs: env_or("REAPER_INTERVAL_SECS", 300),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fulfillment tunables derived from this configuration.
    pub fn fulfillment(&self) -> saga::FulfillmentConfig {
        saga::FulfillmentConfig {
            abandoned_cart_timeout: chrono::Duration::minutes(self.abandoned_cart_timeout_mins),
            reminder_lead: chrono::Duration::minutes(5),
            reminders_enabled: self.reminders_enabled,
            frontend_base_url: self.frontend_base_url.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            allow_unverified_webhooks: false,
            notify_sender: "orders@example.com".to_string(),
            abandoned_cart_timeout_mins: 30,
            reminders_enabled: true,
            frontend_base_url: "http://localhost:3000".to_string(),
            reaper_interval_secs: 300,
        }
    }
}
