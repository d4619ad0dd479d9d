//! Channel names - subscription topics on the realtime transport
//!
//! Channels are opaque strings to the transport; the constructors here
//! capture the naming scheme the platform actually uses.

use crate::value_objects::{PlayerId, TableId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of one subscription topic (e.g. a table or player channel)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    /// Create a channel name from an arbitrary string
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The per-table channel carrying game and table notifications
    #[must_use]
    pub fn table(table_id: TableId) -> Self {
        Self(format!("/table/t{table_id}"))
    }

    /// The per-table spectator channel (not subscribed by default)
    #[must_use]
    pub fn table_spectators(table_id: TableId) -> Self {
        Self(format!("/table/ts{table_id}"))
    }

    /// The per-player channel for account-scoped notifications
    #[must_use]
    pub fn player(player_id: PlayerId) -> Self {
        Self(format!("/player/p{player_id}"))
    }

    /// Get the channel name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ChannelName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ChannelName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
