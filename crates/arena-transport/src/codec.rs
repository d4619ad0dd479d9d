//! Frame codec
//!
//! The platform multiplexes messages as concatenated
//! `<length>:<id><payload>` segments, where `length` is the character count
//! of the id digits plus the compact-JSON payload text. The same format is
//! used for the long-poll transport (many frames per message) and the
//! persistent connection (exactly one frame per message).

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Reserved frame ids
///
/// Ids outside this set still decode; the receive loop ignores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Handshake response carrying the session parameters
    Open = 0,
    /// Heartbeat / upgrade probe (client to server)
    Ping = 2,
    /// Heartbeat acknowledgment / probe acknowledgment (server to client)
    Pong = 3,
    /// Upgrade confirmation after a successful probe exchange
    Upgrade = 5,
    /// Namespace connect marker sent alongside the handshake
    Connect = 40,
    /// Application event (`["join", ...]`, `["bgamsg", ...]`, ...)
    Event = 42,
}

impl FrameKind {
    /// Create a `FrameKind` from a raw frame id
    #[must_use]
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Open),
            2 => Some(Self::Ping),
            3 => Some(Self::Pong),
            5 => Some(Self::Upgrade),
            40 => Some(Self::Connect),
            42 => Some(Self::Event),
            _ => None,
        }
    }

    /// Get the raw frame id
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self as u64
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u64)
    }
}

/// One length-prefixed `<id><payload>` unit of the wire format
///
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub id: u64,
    pub payload: Option<Value>,
}

impl Frame {
    /// Create a frame with a payload
    #[must_use]
    pub fn new(id: u64, payload: Value) -> Self {
        Self {
            id,
            payload: Some(payload),
        }
    }

    /// Create a frame without a payload
    #[must_use]
    pub const fn bare(id: u64) -> Self {
        Self { id, payload: None }
    }

    /// The reserved kind of this frame, if it has one
    #[must_use]
    pub fn kind(&self) -> Option<FrameKind> {
        FrameKind::from_u64(self.id)
    }

    // === Reserved protocol messages ===

    /// Heartbeat ping
    #[must_use]
    pub const fn ping() -> Self {
        Self::bare(FrameKind::Ping.as_u64())
    }

    /// Upgrade probe
    #[must_use]
    pub fn probe() -> Self {
        Self::new(FrameKind::Ping.as_u64(), Value::String("probe".into()))
    }

    /// Upgrade confirmation
    #[must_use]
    pub const fn upgrade() -> Self {
        Self::bare(FrameKind::Upgrade.as_u64())
    }

    /// Channel subscription event
    #[must_use]
    pub fn join(channel: &str) -> Self {
        Self::new(
            FrameKind::Event.as_u64(),
            serde_json::json!(["join", channel]),
        )
    }

    /// Whether this frame is a probe acknowledgment from the peer
    #[must_use]
    pub fn is_probe_ack(&self) -> bool {
        self.kind() == Some(FrameKind::Pong)
            && self.payload.as_ref().and_then(Value::as_str) == Some("probe")
    }
}

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// The prefix pattern did not match or the segment is truncated.
    /// Fatal to the whole decode call; no partial result is produced.
    #[error("Malformed frame at offset {offset}")]
    MalformedFrame { offset: usize },

    /// A structurally well-formed segment carried undecodable JSON.
    /// The caller may drop just this frame.
    #[error("Invalid JSON payload in frame at offset {offset}: {source}")]
    ProtocolJson {
        offset: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Encode frames into one multiplexed message
///
/// `decode(encode(frames)) == frames` for all JSON-serializable payloads.
#[must_use]
pub fn encode(frames: &[Frame]) -> String {
    let mut out = String::new();
    for frame in frames {
        let payload_text = match &frame.payload {
            // serde_json's default string form is the compact encoding
            Some(value) => value.to_string(),
            None => String::new(),
        };
        let id_text = frame.id.to_string();
        let length = id_text.chars().count() + payload_text.chars().count();
        out.push_str(&length.to_string());
        out.push(':');
        out.push_str(&id_text);
        out.push_str(&payload_text);
    }
    out
}

/// Encode a single frame (the persistent-connection message form)
#[must_use]
pub fn encode_one(frame: &Frame) -> String {
    encode(std::slice::from_ref(frame))
}

/// Decode a multiplexed message into frames
///
/// Lengths are counted in characters from the start of the id digits, which
/// is how the platform counts them. The id is the run of digits following the
/// colon; the remainder of the segment is the payload text.
pub fn decode(text: &str) -> Result<Vec<Frame>, CodecError> {
    let chars: Vec<char> = text.chars().collect();
    let mut frames = Vec::new();
    let mut p = 0;

    while p < chars.len() {
        let segment_start = p;

        // <digits>:
        let length = read_digits(&chars, &mut p)
            .ok_or(CodecError::MalformedFrame {
                offset: segment_start,
            })?
            .parse::<usize>()
            .map_err(|_| CodecError::MalformedFrame {
                offset: segment_start,
            })?;
        if chars.get(p) != Some(&':') {
            return Err(CodecError::MalformedFrame {
                offset: segment_start,
            });
        }
        p += 1;

        // <id digits>, bounded by the segment length
        let id_start = p;
        let segment_end = id_start
            .checked_add(length)
            .ok_or(CodecError::MalformedFrame {
                offset: segment_start,
            })?;
        if segment_end > chars.len() {
            return Err(CodecError::MalformedFrame {
                offset: segment_start,
            });
        }
        let id_text: String = chars[id_start..segment_end]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if id_text.is_empty() {
            return Err(CodecError::MalformedFrame {
                offset: segment_start,
            });
        }
        let id = id_text
            .parse::<u64>()
            .map_err(|_| CodecError::MalformedFrame {
                offset: segment_start,
            })?;

        let payload_text: String = chars[id_start + id_text.len()..segment_end].iter().collect();
        let trimmed = payload_text.trim();
        let payload = if trimmed.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(trimmed).map_err(|source| CodecError::ProtocolJson {
                    offset: segment_start,
                    source,
                })?,
            )
        };

        frames.push(Frame { id, payload });
        p = segment_end;
    }

    Ok(frames)
}

fn read_digits(chars: &[char], p: &mut usize) -> Option<String> {
    let start = *p;
    while *p < chars.len() && chars[*p].is_ascii_digit() {
        *p += 1;
    }
    if *p == start {
        None
    } else {
        Some(chars[start..*p].iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_join_frame() {
        let frame = Frame::join("/table/t5");
        // length 22 = 2 id digits + 20 payload characters
        assert_eq!(encode_one(&frame), "22:42[\"join\",\"/table/t5\"]");
    }

    #[test]
    fn test_encode_observed_traffic() {
        // Segment shapes captured from the platform's own client
        let frames = [
            Frame::join("/table/ts226845327"),
            Frame::join("/player/p86152093"),
        ];
        assert_eq!(
            encode(&frames),
            "31:42[\"join\",\"/table/ts226845327\"]30:42[\"join\",\"/player/p86152093\"]"
        );
    }

    #[test]
    fn test_encode_bare_frame() {
        assert_eq!(encode_one(&Frame::ping()), "1:2");
        assert_eq!(encode_one(&Frame::upgrade()), "1:5");
    }

    #[test]
    fn test_decode_handshake_response() {
        let text = r#"96:0{"sid":"tKSrqutPoxgZKJeMAF2z","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}2:40"#;
        let frames = decode(text).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].kind(), Some(FrameKind::Open));
        assert_eq!(
            frames[0].payload.as_ref().unwrap()["sid"],
            "tKSrqutPoxgZKJeMAF2z"
        );
        assert_eq!(frames[1].kind(), Some(FrameKind::Connect));
        assert_eq!(frames[1].payload, None);
    }

    #[test]
    fn test_roundtrip() {
        let frames = vec![
            Frame::probe(),
            Frame::bare(5),
            Frame::new(42, json!(["bgamsg", {"channel": "/table/t1", "packet_id": 3}])),
            Frame::join("/table/t226845327"),
        ];

        let encoded = encode(&frames);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn test_roundtrip_multibyte_payload() {
        // Lengths are character counts, not byte counts
        let frames = vec![Frame::new(42, json!(["bgamsg", "héllo wörld ✓"]))];
        let decoded = decode(&encode(&frames)).unwrap();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn test_decode_malformed_prefix() {
        for text in [
            "not a frame",
            "12;42[]",
            ":42",
            "5:",
            "abc:1",
            // A length near usize::MAX must reject, not overflow
            "18446744073709551615:2",
        ] {
            let err = decode(text).unwrap_err();
            assert!(
                matches!(err, CodecError::MalformedFrame { .. }),
                "expected MalformedFrame for {text:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn test_decode_truncated_segment() {
        let err = decode("99:42[\"join\"]").unwrap_err();
        assert!(matches!(err, CodecError::MalformedFrame { offset: 0 }));
    }

    #[test]
    fn test_decode_trailing_garbage_reports_offset() {
        let good = encode_one(&Frame::ping());
        let text = format!("{good}???");
        let err = decode(&text).unwrap_err();
        assert!(matches!(err, CodecError::MalformedFrame { offset } if offset == good.len()));
    }

    #[test]
    fn test_decode_invalid_json_payload() {
        // Well-formed segment, broken payload
        let err = decode("10:42{broken}").unwrap_err();
        assert!(matches!(err, CodecError::ProtocolJson { .. }));
    }

    #[test]
    fn test_probe_ack_detection() {
        let frames = decode("8:3\"probe\"").unwrap();
        assert!(frames[0].is_probe_ack());

        // A bare pong is a heartbeat ack, not a probe ack
        assert!(!Frame::bare(3).is_probe_ack());
    }
}
