//! Application configuration structs
//!
//! Loads configuration from environment variables and an optional .env file.

use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub platform: PlatformConfig,
    pub credentials: CredentialsConfig,
    pub transport: TransportConfig,
    pub tables: TableConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
    /// Write logs to this file instead of stdout
    #[serde(default)]
    pub log_file: Option<std::path::PathBuf>,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Endpoints of the gaming platform
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the main web server
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Base URL of the main server's realtime endpoint
    #[serde(default = "default_realtime_url")]
    pub realtime_url: String,
    /// Path component of the realtime endpoint
    #[serde(default = "default_realtime_path")]
    pub realtime_path: String,
}

/// The pre-established platform session this process acts as
///
/// Login and page scraping happen outside this process; the resulting
/// identifiers are handed in through the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    /// Numeric account id
    pub user_id: u64,
    /// Account display name (sent on realtime requests)
    pub username: String,
    /// Realtime-transport credential token issued at login
    pub realtime_credentials: String,
}

/// Realtime transport tuning
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Delay before a dropped session reconnects, in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// How long to wait for the probe acknowledgment, in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

/// Per-table loop tuning
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    /// Queue-drain timeout and therefore the worker's wake-up cadence
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
    /// Interval of the fallback status poll, in milliseconds
    #[serde(default = "default_status_poll_ms")]
    pub status_poll_ms: u64,
    /// How long a finished table lingers to flush trailing notifications
    #[serde(default = "default_finish_grace_ms")]
    pub finish_grace_ms: u64,
}

// Default value functions
fn default_app_name() -> String {
    "arenabot".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_base_url() -> String {
    "https://boardgamearena.com".to_string()
}

fn default_realtime_url() -> String {
    "https://r2.boardgamearena.net".to_string()
}

fn default_realtime_path() -> String {
    "r".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    3_000
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}

fn default_dispatch_timeout_ms() -> u64 {
    1_000
}

fn default_status_poll_ms() -> u64 {
    5_000
}

fn default_finish_grace_ms() -> u64 {
    10_000
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
                log_file: env::var("LOG_FILE").ok().map(std::path::PathBuf::from),
            },
            platform: PlatformConfig {
                base_url: env::var("PLATFORM_BASE_URL").unwrap_or_else(|_| default_base_url()),
                realtime_url: env::var("PLATFORM_REALTIME_URL")
                    .unwrap_or_else(|_| default_realtime_url()),
                realtime_path: env::var("PLATFORM_REALTIME_PATH")
                    .unwrap_or_else(|_| default_realtime_path()),
            },
            credentials: CredentialsConfig {
                user_id: env::var("ARENA_USER_ID")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(ConfigError::MissingVar("ARENA_USER_ID"))?,
                username: env::var("ARENA_USERNAME")
                    .map_err(|_| ConfigError::MissingVar("ARENA_USERNAME"))?,
                realtime_credentials: env::var("ARENA_REALTIME_CREDENTIALS")
                    .map_err(|_| ConfigError::MissingVar("ARENA_REALTIME_CREDENTIALS"))?,
            },
            transport: TransportConfig {
                reconnect_delay_ms: env::var("TRANSPORT_RECONNECT_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_reconnect_delay_ms),
                probe_timeout_ms: env::var("TRANSPORT_PROBE_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_probe_timeout_ms),
            },
            tables: TableConfig {
                dispatch_timeout_ms: env::var("TABLE_DISPATCH_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_dispatch_timeout_ms),
                status_poll_ms: env::var("TABLE_STATUS_POLL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_status_poll_ms),
                finish_grace_ms: env::var("TABLE_FINISH_GRACE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(default_finish_grace_ms),
            },
        })
    }

    /// Fixed configuration for tests, bypassing the environment
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            app: AppSettings {
                name: default_app_name(),
                env: Environment::Development,
                log_file: None,
            },
            platform: PlatformConfig {
                base_url: "http://127.0.0.1:0".to_string(),
                realtime_url: "http://127.0.0.1:0".to_string(),
                realtime_path: default_realtime_path(),
            },
            credentials: CredentialsConfig {
                user_id: 86_152_093,
                username: "testbot".to_string(),
                realtime_credentials: "test-credentials".to_string(),
            },
            transport: TransportConfig {
                reconnect_delay_ms: 100,
                probe_timeout_ms: 1_000,
            },
            tables: TableConfig {
                dispatch_timeout_ms: 50,
                status_poll_ms: 200,
                finish_grace_ms: 100,
            },
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
