//! # arena-core
//!
//! Domain layer containing value objects, typed schemas for the platform's
//! JSON payloads, and the notification type model.
//! This crate has zero dependencies on infrastructure (HTTP, websockets, etc.).

pub mod entities;
pub mod error;
pub mod events;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    DecisionArgs, DecisionKind, GameState, HistoryPage, NotificationEnvelope,
    NotificationMessage, SeatStatus, TableInfos, TableSeat, TableStatus,
};
pub use error::DomainError;
pub use events::Notification;
pub use value_objects::{ChannelName, PlayerId, TableId, TableIdParseError};
