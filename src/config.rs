// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! On Cloud Run secrets are injected as environment variables via secret
//! bindings, so a single `from_env` covers local and deployed runs.

use crate::services::providers::{WeatherCondition, WeatherReport};
use chrono::{FixedOffset, Offset};
use std::env;
use std::time::Duration;

/// Cloud Tasks queue carrying listing change events.
pub const LISTING_EVENTS_QUEUE_NAME: &str = "listing-events";

/// Service account Cloud Tasks signs callback tokens as.
pub fn tasks_invoker_email(project_id: &str) -> String {
    format!("ridepool-api@{project_id}.iam.gserviceaccount.com")
}

/// Where committed listing changes are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFeedMode {
    /// In-process channel consumed by a coordinator task
    Local,
    /// Cloud Tasks queue calling back into `/tasks/listing-changed`
    Tasks,
}

impl std::str::FromStr for ChangeFeedMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "tasks" => Ok(Self::Tasks),
            _ => Err(ConfigError::Invalid("CHANGE_FEED", s.to_string())),
        }
    }
}

/// Where listings and notification markers live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// Process-local maps; state is lost on restart
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// Public URL of this API (Cloud Tasks callback target)
    pub api_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// GCP region (for Cloud Tasks)
    pub gcp_region: String,
    /// Server port
    pub port: u16,
    /// Push gateway endpoint; log-only delivery when unset
    pub push_gateway_url: Option<String>,
    pub store_backend: StoreBackend,
    pub change_feed: ChangeFeedMode,
    pub sweep_interval: Duration,
    /// Market local time offset for fare time-of-day factors
    pub fare_utc_offset: FixedOffset,
    /// Retries after a transaction conflict before reporting `Stale`
    pub tx_max_retries: u32,
    /// Conditions quoted when no live weather feed is wired in
    pub weather: WeatherReport,

    /// JWT signing key shared with the auth provider (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Config for tests: in-process feed, Dhaka time, fixed signing key.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            api_url: "http://localhost:8080".to_string(),
            gcp_project_id: "test-project".to_string(),
            gcp_region: "asia-south1".to_string(),
            port: 8080,
            push_gateway_url: None,
            store_backend: StoreBackend::Memory,
            change_feed: ChangeFeedMode::Local,
            sweep_interval: Duration::from_secs(60),
            fare_utc_offset: FixedOffset::east_opt(6 * 3600).unwrap_or(chrono::Utc.fix()),
            tx_max_retries: 3,
            weather: WeatherReport::default(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let offset_minutes: i32 = parse_or("FARE_UTC_OFFSET_MINUTES", 360)?;
        let fare_utc_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            ConfigError::Invalid("FARE_UTC_OFFSET_MINUTES", offset_minutes.to_string())
        })?;

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            api_url: env::var("API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "asia-south1".to_string()),
            port: parse_or("PORT", 8080)?,
            push_gateway_url: env::var("PUSH_GATEWAY_URL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            store_backend: env::var("STORE_BACKEND")
                .unwrap_or_else(|_| "firestore".to_string())
                .parse()?,
            change_feed: env::var("CHANGE_FEED")
                .unwrap_or_else(|_| "local".to_string())
                .parse()?,
            sweep_interval: Duration::from_secs(parse_or("SWEEP_INTERVAL_SECS", 60)?),
            fare_utc_offset,
            tx_max_retries: parse_or("TX_MAX_RETRIES", 3)?,
            weather: WeatherReport {
                condition: env::var("WEATHER_CONDITION")
                    .map(|raw| WeatherCondition::parse(&raw))
                    .unwrap_or(WeatherCondition::Clear),
                temperature_c: parse_or("WEATHER_TEMP_C", WeatherReport::default().temperature_c)?,
            },

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }
}

/// Parse an optional numeric variable, falling back to `default` when unset.
fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("CHANGE_FEED", "tasks");
        env::set_var("FARE_UTC_OFFSET_MINUTES", "330");
        env::set_var("WEATHER_CONDITION", "Thunderstorm");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.jwt_signing_key, b"test_jwt_key_32_bytes_minimum!!");
        assert_eq!(config.change_feed, ChangeFeedMode::Tasks);
        assert_eq!(config.fare_utc_offset.local_minus_utc(), 330 * 60);
        assert_eq!(config.port, 8080);
        assert_eq!(config.tx_max_retries, 3);
        assert_eq!(config.weather.condition, WeatherCondition::Thunderstorm);
        assert_eq!(config.weather.temperature_c, 25.0);

        env::remove_var("CHANGE_FEED");
        env::remove_var("FARE_UTC_OFFSET_MINUTES");
        env::remove_var("WEATHER_CONDITION");
    }

    #[test]
    fn test_change_feed_mode_parse() {
        assert_eq!("Local".parse::<ChangeFeedMode>().unwrap(), ChangeFeedMode::Local);
        assert!("kafka".parse::<ChangeFeedMode>().is_err());
        assert_eq!(" memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("postgres".parse::<StoreBackend>().is_err());
    }
}
