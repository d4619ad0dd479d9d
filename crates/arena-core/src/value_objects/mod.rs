//! Value objects - immutable types that represent domain concepts

mod channel_name;
mod ids;

pub use channel_name::ChannelName;
pub use ids::{PlayerId, TableId, TableIdParseError};

pub(crate) mod flexible;
