//! Boundary between table orchestration and actual game rules.
//!
//! The orchestration layer knows when it is the local player's turn; what a
//! turn *means* for a given game lives behind [`GameLogic`]. Implementations
//! submit moves through the platform client handed to them in the context.

use async_trait::async_trait;
use thiserror::Error;

use arena_core::{GameState, TableId};

use crate::error::ClientError;
use crate::platform::PlatformClient;

/// Failures from a game logic implementation.
#[derive(Debug, Error)]
pub enum GameError {
    /// The game reached a state this logic cannot continue from. The table
    /// worker reacts by proposing to abandon the game.
    #[error("invalid game state: {0}")]
    InvalidState(String),

    /// A move submission or lookup failed at the HTTP layer.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Everything a game logic implementation gets to act on its turn.
pub struct TurnContext<'a> {
    pub table: TableId,
    pub gameserver: &'a str,
    pub state: &'a GameState,
    pub client: &'a PlatformClient,
}

/// One game's rules, as far as this client needs them.
#[async_trait]
pub trait GameLogic: Send + Sync {
    /// Name the platform uses for this game in its URLs.
    fn game_name(&self) -> &str;

    /// Called when the game state changed live and the local player is the
    /// active player.
    async fn on_turn(&self, ctx: TurnContext<'_>) -> Result<(), GameError>;
}
