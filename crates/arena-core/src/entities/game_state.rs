//! Game state snapshot schema

use crate::value_objects::{flexible, PlayerId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The platform's current-state snapshot for one game
///
/// Only the fields every game shares are typed; game-specific fields stay in
/// `extra` for the game-logic collaborator to interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GameState {
    /// Numeric id of the game's current state-machine state
    #[serde(default, deserialize_with = "flexible::opt_u64_from_any")]
    pub id: Option<u64>,

    /// Player whose turn it is, if any
    #[serde(default, deserialize_with = "flexible::opt_u64_from_any")]
    pub active_player: Option<u64>,

    /// Game-specific fields, passed through untyped
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GameState {
    /// Whether the given player is the active player in this snapshot
    #[must_use]
    pub fn is_active(&self, player_id: PlayerId) -> bool {
        self.active_player == Some(player_id.into_inner())
    }
}
