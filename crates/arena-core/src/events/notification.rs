//! Per-type notification variants
//!
//! A closed tagged variant over the notification types this client acts on,
//! with an explicit unhandled arm so unknown server message types are logged
//! and dropped instead of failing the dispatch.

use crate::entities::{DecisionArgs, GameState, NotificationMessage, TableInfos};
use crate::error::DomainError;

/// One classified table notification
#[derive(Debug, Clone)]
pub enum Notification {
    /// The table's top-level information changed
    TableInfosChanged(TableInfos),
    /// All invited players have accepted
    AllPlayersAccepted,
    /// A group decision (abandon vote, mode switch) was offered or updated
    TableDecision(DecisionArgs),
    /// Informational note from the platform
    SimpleNote(Option<String>),
    /// The platform acknowledged our turn notification
    YourTurnAck,
    /// The platform nudged idle players
    WakeupPlayers,
    /// The game's state machine advanced
    GameStateChange(GameState),
    /// Reflexion clocks were updated
    UpdateReflexionTime,
    /// Final score posted
    FinalScore,
    /// A previously posted result was neutralized
    GameResultNeutralized,
    /// Any type this client does not handle; kept for logging
    Unhandled { kind: String },
}

impl Notification {
    /// Classify one raw notification message
    ///
    /// Known types with an unparseable payload are an `UnexpectedPayload`
    /// error; unknown types are `Unhandled`, never an error.
    pub fn classify(message: &NotificationMessage) -> Result<Self, DomainError> {
        let notification = match message.kind.as_str() {
            "tableInfosChanged" => Self::TableInfosChanged(message.args_as()?),
            "allPlayersAccepted" => Self::AllPlayersAccepted,
            "tableDecision" => Self::TableDecision(message.args_as()?),
            // The platform spells this tag both ways
            "simpleNote" | "simpleNode" => Self::SimpleNote(message.log.clone()),
            "yourturnack" => Self::YourTurnAck,
            "wakeupPlayers" => Self::WakeupPlayers,
            "gameStateChange" => Self::GameStateChange(message.args_as()?),
            "updateReflexionTime" => Self::UpdateReflexionTime,
            "finalScore" => Self::FinalScore,
            "gameResultNeutralized" => Self::GameResultNeutralized,
            other => Self::Unhandled {
                kind: other.to_string(),
            },
        };
        Ok(notification)
    }

    /// The type tag this variant was classified from
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::TableInfosChanged(_) => "tableInfosChanged",
            Self::AllPlayersAccepted => "allPlayersAccepted",
            Self::TableDecision(_) => "tableDecision",
            Self::SimpleNote(_) => "simpleNote",
            Self::YourTurnAck => "yourturnack",
            Self::WakeupPlayers => "wakeupPlayers",
            Self::GameStateChange(_) => "gameStateChange",
            Self::UpdateReflexionTime => "updateReflexionTime",
            Self::FinalScore => "finalScore",
            Self::GameResultNeutralized => "gameResultNeutralized",
            Self::Unhandled { kind } => kind,
        }
    }
}
