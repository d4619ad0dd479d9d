//! Integration test utilities for the realtime transport
//!
//! Provides an in-process mock of the platform's notification endpoint
//! (polling handshake, subscription POSTs, and the websocket dialect) so
//! transport sessions can be exercised end to end without the real servers.

pub mod mock_platform;

pub use mock_platform::{wait_for, MockOptions, MockPlatform};
