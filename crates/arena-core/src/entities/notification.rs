//! Notification envelope schemas
//!
//! The decoded form of one inbound application event, shared between the
//! live realtime path and the replayed notification history.

use chrono::{DateTime, Utc};

use crate::error::DomainError;
use crate::value_objects::{flexible, ChannelName};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// One decoded inbound application event on a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub channel: ChannelName,

    /// Per-channel sequence number; `0` means "unordered, always deliver"
    #[serde(default, deserialize_with = "flexible::u64_from_any")]
    pub packet_id: u64,

    /// The individual notifications carried by this envelope
    #[serde(default)]
    pub data: Vec<NotificationMessage>,
}

/// One notification inside an envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Type tag, e.g. `gameStateChange` or `tableDecision`
    #[serde(rename = "type")]
    pub kind: String,

    /// Human-readable log line attached by the platform, if any
    #[serde(default)]
    pub log: Option<String>,

    /// Server-side send time, seconds since the epoch
    #[serde(default, deserialize_with = "flexible::opt_u64_from_any")]
    pub time: Option<u64>,

    /// Type-specific arguments
    #[serde(default)]
    pub args: Value,
}

impl NotificationMessage {
    /// The server-side send time as a calendar timestamp
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.time
            .and_then(|secs| DateTime::from_timestamp(i64::try_from(secs).ok()?, 0))
    }

    /// Parse `args` into a typed schema
    ///
    /// An unexpected shape is a distinct error rather than a crash.
    pub fn args_as<T: DeserializeOwned>(&self) -> Result<T, DomainError> {
        serde_json::from_value(self.args.clone()).map_err(|e| DomainError::UnexpectedPayload {
            kind: self.kind.clone(),
            reason: e.to_string(),
        })
    }
}

/// A page of replayed notification history
///
/// The endpoint nests the entries one level deeper than the live stream
/// (`{"data": {"data": [...]}}`).
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPage {
    data: HistoryData,
}

#[derive(Debug, Clone, Deserialize)]
struct HistoryData {
    #[serde(default)]
    data: Vec<NotificationEnvelope>,
}

impl HistoryPage {
    /// The replayed envelopes, oldest first
    #[must_use]
    pub fn entries(&self) -> &[NotificationEnvelope] {
        &self.data.data
    }

    /// Consume the page, yielding the replayed envelopes
    #[must_use]
    pub fn into_entries(self) -> Vec<NotificationEnvelope> {
        self.data.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::GameState;

    #[test]
    fn test_envelope_parse() {
        let json = r#"{
            "channel": "/table/t226845327",
            "packet_id": "7",
            "data": [
                {"type": "gameStateChange", "time": "1640545851", "args": {"id": 10, "active_player": "86152093"}},
                {"type": "simpleNote", "log": "hello"}
            ]
        }"#;

        let envelope: NotificationEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.packet_id, 7);
        assert_eq!(envelope.data.len(), 2);
        assert_eq!(envelope.data[0].kind, "gameStateChange");
        assert_eq!(envelope.data[0].time, Some(1_640_545_851));
        assert!(envelope.data[0].timestamp().is_some());
        assert_eq!(envelope.data[1].timestamp(), None);

        let state: GameState = envelope.data[0].args_as().unwrap();
        assert_eq!(state.id, Some(10));
    }

    #[test]
    fn test_envelope_defaults_packet_id_to_zero() {
        let json = r#"{"channel": "/table/t1", "data": []}"#;
        let envelope: NotificationEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.packet_id, 0);
    }

    #[test]
    fn test_args_as_unexpected_shape() {
        let msg = NotificationMessage {
            kind: "gameStateChange".to_string(),
            log: None,
            time: None,
            args: serde_json::json!(["not", "an", "object"]),
        };

        let err = msg.args_as::<GameState>().unwrap_err();
        assert!(matches!(err, DomainError::UnexpectedPayload { .. }));
    }

    #[test]
    fn test_history_page_nesting() {
        let json = r#"{"data": {"data": [
            {"channel": "/table/t1", "packet_id": 1, "data": []},
            {"channel": "/table/t1", "packet_id": 2, "data": []}
        ]}}"#;

        let page: HistoryPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.entries().len(), 2);
        assert_eq!(page.into_entries()[1].packet_id, 2);
    }
}
