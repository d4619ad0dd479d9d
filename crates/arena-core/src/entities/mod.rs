//! Typed schemas for the platform's JSON payloads

mod decision;
mod game_state;
mod notification;
mod table;

pub use decision::{DecisionArgs, DecisionKind};
pub use game_state::GameState;
pub use notification::{HistoryPage, NotificationEnvelope, NotificationMessage};
pub use table::{SeatStatus, TableInfos, TableSeat, TableStatus};
