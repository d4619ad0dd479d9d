//! # arena-transport
//!
//! Client side of the platform's realtime notification transport: the
//! length-prefixed frame codec, the handshake/upgrade/heartbeat session state
//! machine, the shared multi-producer notification queue, and the hub that
//! groups sessions over one queue.

pub mod codec;
pub mod hub;
pub mod queue;
pub mod session;

pub use codec::{CodecError, Frame, FrameKind};
pub use hub::NotificationHub;
pub use queue::{NotificationQueue, NotificationSink, QueueEntry};
pub use session::{
    EndpointConfig, Handshake, SessionConfig, SessionState, TransportError, TransportSession,
};
