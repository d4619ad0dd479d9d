//! # arena-table
//!
//! Orchestration of one table per worker task: status-driven lifecycle,
//! per-channel packet sequencing, default decision votes, and the turn
//! hand-off to the game logic collaborator. The registry and application
//! context tie workers to the process.

pub mod context;
pub mod registry;
pub mod worker;

pub use context::AppContext;
pub use registry::{TableHandle, TableRegistry};
pub use worker::TableWorker;
