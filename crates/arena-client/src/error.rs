//! Errors from platform HTTP calls

use thiserror::Error;

/// Failures surfaced by [`PlatformClient`](crate::PlatformClient) calls.
///
/// All variants are retryable from the caller's point of view.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connect, TLS, body read).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered but refused the request (non-2xx status or a
    /// `status: 0` JSON body).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The platform answered with a body this client cannot interpret.
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),
}

impl ClientError {
    /// Short machine-readable code for logs.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "HTTP",
            Self::Rejected(_) => "REJECTED",
            Self::UnexpectedPayload(_) => "UNEXPECTED_PAYLOAD",
        }
    }
}
