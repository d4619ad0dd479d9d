//! # arena-common
//!
//! Shared infrastructure: configuration loading, tracing setup, and the
//! application-wide error type.

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{AppConfig, ConfigError, CredentialsConfig, PlatformConfig};
pub use error::{AppError, AppResult};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
