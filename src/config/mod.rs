use std::env;
use std::path::PathBuf;

use chrono::Duration;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";
const DEFAULT_PAYMENT_WINDOW_HOURS: i64 = 2;

/// Process configuration, read once at startup and handed to the wiring.
/// Nothing below this layer touches the environment.
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// How long a buyer has to get a reservation confirmed before it
    /// expires automatically.
    pub payment_window: Duration,
    pub allowed_origins: Vec<String>,
    pub enable_hsts: bool,
    pub artifact_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let payment_window_hours = env::var("PAYMENT_WINDOW_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|hours| *hours > 0)
            .unwrap_or(DEFAULT_PAYMENT_WINDOW_HOURS);

        let allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        let enable_hsts = env::var("RUST_ENV")
            .map(|v| v.to_lowercase() == "production")
            .unwrap_or(false);

        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/tribune".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3001),
            payment_window: Duration::hours(payment_window_hours),
            allowed_origins,
            enable_hsts,
            artifact_dir: env::var("ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./artifacts")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        env::remove_var("PAYMENT_WINDOW_HOURS");
        env::remove_var("PORT");
        env::remove_var("RUST_ENV");

        let config = Config::from_env();
        assert_eq!(config.payment_window, Duration::hours(2));
        assert_eq!(config.port, 3001);
        assert!(!config.enable_hsts);
        assert!(!config.allowed_origins.is_empty());
    }
}
