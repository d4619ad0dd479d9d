//! Table decision schema - group votes offered to the players

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of decision the table is voting on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Someone proposed abandoning the game
    Abandon,
    /// Someone proposed switching the table to turn-based mode
    SwitchTb,
    /// No decision currently pending
    #[default]
    None,
    /// Any decision type this client does not know
    #[serde(other)]
    Unknown,
}

/// Arguments of a `tableDecision` notification (or the decision block
/// embedded in the game page)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DecisionArgs {
    #[serde(default)]
    pub decision_type: DecisionKind,

    /// The vote the local player has already cast, if any; the platform
    /// encodes this as a number, a string, or null
    #[serde(default)]
    pub decision_taken: Option<Value>,
}

impl DecisionArgs {
    /// Whether there is actually a decision to act on
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !matches!(self.decision_type, DecisionKind::None)
    }

    /// Whether the local player has already cast a vote on this decision
    #[must_use]
    pub fn already_voted(&self) -> bool {
        match &self.decision_taken {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
            Some(Value::String(s)) => !s.is_empty() && s != "0" && s != "false",
            Some(_) => true,
        }
    }

    /// The vote this client casts by default, if the decision type is known
    ///
    /// Abandon requests are accepted; switching to turn-based mode is
    /// rejected because this client only plays realtime tables.
    #[must_use]
    pub fn default_vote(&self) -> Option<u8> {
        match self.decision_type {
            DecisionKind::Abandon => Some(1),
            DecisionKind::SwitchTb => Some(0),
            DecisionKind::None | DecisionKind::Unknown => None,
        }
    }
}
