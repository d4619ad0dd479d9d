//! Session registry sharing one notification queue.
//!
//! A hub owns the queue every session delivers into, so one consumer loop
//! can drain notifications from any number of endpoints in arrival order.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::queue::{NotificationQueue, NotificationSink};
use crate::session::{SessionConfig, TransportSession};

/// Owns the shared [`NotificationQueue`] and every live session.
pub struct NotificationHub {
    queue: Arc<NotificationQueue>,
    sessions: DashMap<Uuid, Arc<TransportSession>>,
}

impl NotificationHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Arc::new(NotificationQueue::new()),
            sessions: DashMap::new(),
        }
    }

    /// Build, start, and track a session wired to the shared queue.
    pub fn create_session(
        &self,
        config: SessionConfig,
        sink: NotificationSink,
    ) -> Arc<TransportSession> {
        let session = Arc::new(TransportSession::new(
            config,
            Arc::clone(&self.queue),
            sink,
        ));
        session.start();
        self.sessions.insert(session.id(), Arc::clone(&session));
        debug!(session_id = %session.id(), count = self.sessions.len(), "session created");
        session
    }

    /// Remove and close one session.
    pub async fn close_session(&self, session: &TransportSession) {
        self.sessions.remove(&session.id());
        session.close().await;
    }

    /// Close every tracked session.
    pub async fn cleanup(&self) {
        let sessions: Vec<Arc<TransportSession>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.sessions.clear();
        for session in sessions {
            session.close().await;
        }
        info!("all sessions closed");
    }

    /// Drain the shared queue; see [`NotificationQueue::dispatch`].
    pub async fn dispatch(&self, block: bool, timeout: Option<Duration>) -> usize {
        self.queue.dispatch(block, timeout).await
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<NotificationQueue> {
        &self.queue
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}
