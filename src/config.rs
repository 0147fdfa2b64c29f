//! Process configuration.
//!
//! Everything comes from the environment (optionally via a .env file).
//! Missing required values fail here, before any network or database call.

use anyhow::{anyhow, Result};
use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub database_url: String,
    /// Minimum interval between outbound API requests.
    pub fetch_min_interval: Duration,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_key = match env::var("APISPORTS_KEY") {
            Ok(v) if !v.trim().is_empty() => v,
            Ok(_) => return Err(anyhow!("APISPORTS_KEY is set but empty")),
            Err(_) => return Err(anyhow!("APISPORTS_KEY is required")),
        };

        // Prevent accidental use of sample/placeholder keys
        let key_lower = api_key.trim().to_lowercase();
        if key_lower.contains("change_me") || key_lower.contains("your_") || key_lower.starts_with("sample") {
            return Err(anyhow!(
                "APISPORTS_KEY appears to be a placeholder value; replace with your real key"
            ));
        }

        let database_url = match env::var("DATABASE_URL") {
            Ok(v) if !v.trim().is_empty() => v,
            Ok(_) => return Err(anyhow!("DATABASE_URL is set but empty")),
            Err(_) => {
                let db_host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
                let db_port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
                let db_name = env::var("DB_NAME").unwrap_or_else(|_| "rosters".to_string());
                let db_user = env::var("DB_USER").unwrap_or_else(|_| "rosters".to_string());
                let db_password = env::var("DB_PASSWORD")
                    .map_err(|_| anyhow!("DB_PASSWORD (or DATABASE_URL) is required"))?;
                format!("postgresql://{db_user}:{db_password}@{db_host}:{db_port}/{db_name}")
            }
        };

        let fetch_min_interval = Duration::from_millis(
            env::var("FETCH_MIN_INTERVAL_MS")
                .unwrap_or_else(|_| "1500".to_string())
                .parse()
                .unwrap_or(1500),
        );
        let http_timeout = Duration::from_secs(
            env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
        );

        Ok(Self {
            api_key,
            database_url,
            fetch_min_interval,
            http_timeout,
        })
    }
}
