//! Domain errors - error types for the domain layer

use thiserror::Error;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    /// A local consistency check failed, e.g. acting on a resource the game
    /// has already consumed. Recovered by abandoning the game, never by
    /// terminating the process.
    #[error("Invalid game state: {0}")]
    InvalidGameState(String),

    /// A known notification type arrived with an unrecognizable payload shape
    #[error("Unexpected payload for '{kind}': {reason}")]
    UnexpectedPayload { kind: String, reason: String },

    /// A required field was absent from a platform response
    #[error("Missing field in platform response: {0}")]
    MissingField(&'static str),

    /// The table references a game server that was never assigned
    #[error("No game server assigned for table {0}")]
    NoGameServer(String),
}

impl DomainError {
    /// Get an error code string for logs
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidGameState(_) => "INVALID_GAME_STATE",
            Self::UnexpectedPayload { .. } => "UNEXPECTED_PAYLOAD",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::NoGameServer(_) => "NO_GAME_SERVER",
        }
    }
}
