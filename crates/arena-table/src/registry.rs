//! Live table workers keyed by table id.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use arena_core::TableId;

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to one spawned table worker.
pub struct TableHandle {
    table: TableId,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TableHandle {
    pub(crate) fn new(
        table: TableId,
        shutdown_tx: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            table,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    #[must_use]
    pub fn table(&self) -> TableId {
        self.table
    }

    /// Signal the worker to stop and wait for it, bounded.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if tokio::time::timeout(JOIN_TIMEOUT, task).await.is_err() {
                warn!(table = %self.table, "table worker did not stop within timeout");
            }
        }
    }
}

/// All tables this process is currently playing.
pub struct TableRegistry {
    workers: DashMap<TableId, Arc<TableHandle>>,
}

impl TableRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            workers: DashMap::new(),
        }
    }

    /// Track a worker. Returns false (and drops nothing) when the table is
    /// already tracked.
    pub fn insert(&self, handle: Arc<TableHandle>) -> bool {
        let table = handle.table();
        if self.workers.contains_key(&table) {
            return false;
        }
        self.workers.insert(table, handle);
        info!(%table, count = self.workers.len(), "table worker registered");
        true
    }

    #[must_use]
    pub fn contains(&self, table: TableId) -> bool {
        self.workers.contains_key(&table)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Untrack one table, returning its handle if it was tracked.
    pub fn remove(&self, table: TableId) -> Option<Arc<TableHandle>> {
        let removed = self.workers.remove(&table).map(|(_, handle)| handle);
        if removed.is_some() {
            info!(%table, count = self.workers.len(), "table worker removed");
        }
        removed
    }

    /// Shut down every tracked worker.
    pub async fn shutdown_all(&self) {
        let handles: Vec<Arc<TableHandle>> = self
            .workers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.workers.clear();
        for handle in handles {
            handle.shutdown().await;
        }
    }
}

impl Default for TableRegistry {
    fn default() -> Self {
        Self::new()
    }
}
