//! # arena-client
//!
//! HTTP collaborator for the game platform's lobby and table endpoints,
//! plus the [`GameLogic`] boundary behind which actual game rules live.

pub mod error;
pub mod logic;
pub mod platform;

pub use error::ClientError;
pub use logic::{GameError, GameLogic, TurnContext};
pub use platform::{GamePage, PlatformClient, RealtimeCredentials};
