use std::env;
use std::time::Duration;

/// Used when `ADMIN_WHATSAPP_NUMBER` is not set.
pub const DEFAULT_ADMIN_WHATSAPP_NUMBER: &str = "916385557932";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Rest,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub store_backend: StoreBackend,
    pub database_url: String,
    pub store_url: String,
    pub store_api_key: String,
    pub store_timeout: Duration,
    pub admin_whatsapp_number: String,
    pub slot_view_cap: usize,
    pub driving_refresh: Duration,
    /// Open booking flows untouched this long are dropped.
    pub flow_idle: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            store_backend: match env::var("STORE_BACKEND").as_deref() {
                Ok("rest") => StoreBackend::Rest,
                _ => StoreBackend::Sqlite,
            },
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "parkpal.db".to_string()),
            store_url: env::var("STORE_URL").unwrap_or_default(),
            store_api_key: env::var("STORE_API_KEY").unwrap_or_default(),
            store_timeout: Duration::from_secs(
                env::var("STORE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            admin_whatsapp_number: env::var("ADMIN_WHATSAPP_NUMBER")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ADMIN_WHATSAPP_NUMBER.to_string()),
            slot_view_cap: env::var("SLOT_VIEW_CAP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            driving_refresh: Duration::from_secs(
                env::var("DRIVING_REFRESH_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3),
            ),
            flow_idle: Duration::from_secs(
                env::var("FLOW_IDLE_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(900),
            ),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            store_backend: StoreBackend::Sqlite,
            database_url: ":memory:".to_string(),
            store_url: String::new(),
            store_api_key: String::new(),
            store_timeout: Duration::from_secs(10),
            admin_whatsapp_number: DEFAULT_ADMIN_WHATSAPP_NUMBER.to_string(),
            slot_view_cap: 30,
            driving_refresh: Duration::from_secs(3),
            flow_idle: Duration::from_secs(900),
        }
    }
}
