//! Application error types
//!
//! Unified error handling for the process-level surface. Transport faults
//! recover inside the session reconnect loop and table inconsistencies end
//! one game; only the variants here can surface from the binary.

use arena_core::DomainError;
use std::fmt;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Startup errors - the only fatal class
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Platform session unusable: {0}")]
    Session(String),

    // Wrapped lower layers
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Platform request failed: {0}")]
    Platform(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    /// Get an error code string for logs
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Session(_) => "SESSION_ERROR",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Platform(_) => "PLATFORM_ERROR",
            Self::Domain(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error should terminate the process
    ///
    /// Only unrecoverable setup failures are fatal; everything else is
    /// recovered closer to where it happened.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Session(_))
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(msg: impl fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
