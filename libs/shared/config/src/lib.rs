use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub listen_port: u16,
    pub booking_window_days: i64,
    pub default_slot_capacity: u32,
    pub auto_create_default_slots: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            jwt_secret: env::var("PORTAL_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("PORTAL_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            listen_port: env::var("PORTAL_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            booking_window_days: env::var("BOOKING_WINDOW_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(7),
            default_slot_capacity: env::var("DEFAULT_SLOT_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(16),
            auto_create_default_slots: env::var("AUTO_CREATE_DEFAULT_SLOTS")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(true),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.jwt_secret.is_empty()
    }
}
