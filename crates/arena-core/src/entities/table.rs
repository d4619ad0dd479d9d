//! Table status schema - the top-level description of one hosted game

use crate::value_objects::{PlayerId, TableId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of a table, as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TableStatus {
    /// Lobby phase, invitations pending
    #[default]
    Open,
    /// All players joined, awaiting game start confirmation
    Setup,
    /// Game in progress
    Play,
    /// Table switched to the turn-based (asynchronous) mode
    AsyncInit,
    /// Terminal state
    Finished,
    /// Any status string this client does not know
    #[serde(other)]
    Unknown,
}

impl TableStatus {
    /// Whether the table has reached its terminal state
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Finished)
    }
}

/// One player's seat at a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSeat {
    /// The player's own status at this table
    #[serde(default)]
    pub table_status: SeatStatus,
}

/// Per-seat status within a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    /// Invited but not yet joined
    #[default]
    Setup,
    /// Expected to join (re-invited)
    Expected,
    /// Joined, waiting for or in the game
    Play,
    /// Any seat status string this client does not know
    #[serde(other)]
    Unknown,
}

impl SeatStatus {
    /// Whether this seat still needs to accept the invitation
    #[must_use]
    pub fn needs_join(self) -> bool {
        matches!(self, Self::Setup | Self::Expected)
    }
}

/// Top-level information about a table and how it is hosted
///
/// Returned by the table-status endpoint and carried inside
/// `tableInfosChanged` notifications.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TableInfos {
    pub id: TableId,

    /// Game server number as a decimal string; `"0"` means not yet assigned
    #[serde(default)]
    pub gameserver: String,

    /// Machine name of the hosted game (used in request paths)
    #[serde(default)]
    pub game_name: String,

    #[serde(default)]
    pub status: TableStatus,

    /// Seats keyed by player id
    #[serde(default)]
    pub players: HashMap<PlayerId, TableSeat>,
}

impl TableInfos {
    /// Whether a real game server has been assigned yet
    ///
    /// The platform reports `"0"` until the table is placed on a server.
    #[must_use]
    pub fn has_gameserver(&self) -> bool {
        !self.gameserver.is_empty() && self.gameserver != "0"
    }

    /// Look up the local player's seat, if present
    #[must_use]
    pub fn seat(&self, player_id: PlayerId) -> Option<&TableSeat> {
        self.players.get(&player_id)
    }
}
