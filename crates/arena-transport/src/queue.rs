//! Ordered delivery queue shared by every transport session.
//!
//! Receive tasks push raw notifications as they arrive on the wire; the
//! owning application drains them from a single consumer task so that
//! callbacks never run on a socket task and never run concurrently.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, trace};

use arena_core::ChannelName;

/// Callback invoked for every drained notification.
///
/// Arguments are the channel the notification arrived on, the raw message
/// body, and whether it was delivered live over the socket (`true`) or
/// replayed from history (`false`).
pub type NotificationSink = Arc<dyn Fn(&ChannelName, Value, bool) + Send + Sync>;

/// A single queued notification awaiting dispatch.
pub struct QueueEntry {
    pub sink: NotificationSink,
    pub channel: ChannelName,
    pub payload: Value,
    pub live: bool,
}

impl std::fmt::Debug for QueueEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEntry")
            .field("channel", &self.channel)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

/// FIFO notification queue with a single-consumer dispatch loop.
///
/// Producers call [`push`](Self::push) from any task. Exactly one consumer
/// at a time may sit in [`dispatch`](Self::dispatch); a second concurrent
/// call waits for the first to finish before draining.
pub struct NotificationQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    notify: Notify,
    // Held across callback invocation so sinks never run concurrently.
    consumer: tokio::sync::Mutex<()>,
}

impl NotificationQueue {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            consumer: tokio::sync::Mutex::new(()),
        }
    }

    /// Number of notifications currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Enqueue a notification and wake a waiting consumer, if any.
    pub fn push(&self, entry: QueueEntry) {
        trace!(channel = %entry.channel, live = entry.live, "queueing notification");
        self.entries.lock().push_back(entry);
        self.notify.notify_one();
    }

    /// Drain the queue and invoke each entry's sink in arrival order.
    ///
    /// When `block` is true and the queue is empty, waits up to `timeout`
    /// (or indefinitely if `timeout` is `None`) for the first entry before
    /// draining. Returns the number of notifications dispatched.
    pub async fn dispatch(&self, block: bool, timeout: Option<Duration>) -> usize {
        let _guard = self.consumer.lock().await;

        if block && self.is_empty() {
            self.wait_for_entry(timeout).await;
        }

        let drained: Vec<QueueEntry> = {
            let mut entries = self.entries.lock();
            entries.drain(..).collect()
        };

        if drained.is_empty() {
            return 0;
        }

        let count = drained.len();
        debug!(count, "dispatching notifications");
        for entry in drained {
            (entry.sink)(&entry.channel, entry.payload, entry.live);
        }
        count
    }

    async fn wait_for_entry(&self, timeout: Option<Duration>) {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        // Poll in short naps so a push between the emptiness check and the
        // notified() registration cannot strand the consumer.
        loop {
            if !self.is_empty() {
                return;
            }
            let nap = match deadline {
                Some(deadline) => {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        return;
                    }
                    (deadline - now).min(Duration::from_millis(50))
                }
                None => Duration::from_millis(50),
            };
            let _ = tokio::time::timeout(nap, self.notify.notified()).await;
        }
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_sink(counter: Arc<AtomicUsize>) -> NotificationSink {
        Arc::new(move |_channel, _payload, _live| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn entry(sink: &NotificationSink, channel: ChannelName, payload: Value) -> QueueEntry {
        QueueEntry {
            sink: Arc::clone(sink),
            channel,
            payload,
            live: true,
        }
    }

    #[tokio::test]
    async fn test_dispatch_preserves_arrival_order() {
        let queue = NotificationQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let sink: NotificationSink = {
            let order = Arc::clone(&order);
            Arc::new(move |_channel, payload, _live| {
                order.lock().push(payload["seq"].as_u64().unwrap());
            })
        };

        for seq in 0..5u64 {
            queue.push(entry(
                &sink,
                ChannelName::table(arena_core::TableId::new(1)),
                json!({ "seq": seq }),
            ));
        }

        let dispatched = queue.dispatch(false, None).await;
        assert_eq!(dispatched, 5);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_keep_relative_order() {
        let queue = Arc::new(NotificationQueue::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink: NotificationSink = {
            let seen = Arc::clone(&seen);
            Arc::new(move |_channel, payload, _live| {
                seen.lock().push((
                    payload["producer"].as_u64().unwrap(),
                    payload["seq"].as_u64().unwrap(),
                ));
            })
        };

        let producers: Vec<_> = (0..4u64)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    for seq in 0..50u64 {
                        queue.push(entry(
                            &sink,
                            ChannelName::table(arena_core::TableId::new(producer)),
                            json!({ "producer": producer, "seq": seq }),
                        ));
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        assert_eq!(queue.dispatch(false, None).await, 200);

        // Producers interleave freely, but each one's own sequence must
        // come out in the order it was pushed.
        let seen = seen.lock();
        let mut last = [None::<u64>; 4];
        for &(producer, seq) in seen.iter() {
            let slot = &mut last[usize::try_from(producer).unwrap()];
            assert!(slot.map_or(true, |prev| seq > prev), "producer {producer} reordered");
            *slot = Some(seq);
        }
    }

    #[tokio::test]
    async fn test_nonblocking_dispatch_on_empty_queue() {
        let queue = NotificationQueue::new();
        assert_eq!(queue.dispatch(false, None).await, 0);
    }

    #[tokio::test]
    async fn test_blocking_dispatch_times_out() {
        let queue = NotificationQueue::new();
        let start = std::time::Instant::now();
        let dispatched = queue
            .dispatch(true, Some(Duration::from_millis(120)))
            .await;
        assert_eq!(dispatched, 0);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_blocking_dispatch_wakes_on_push() {
        let queue = Arc::new(NotificationQueue::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let sink = counting_sink(Arc::clone(&counter));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dispatch(true, Some(Duration::from_secs(5))).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.push(entry(
            &sink,
            ChannelName::player(arena_core::PlayerId::new(42)),
            json!({}),
        ));

        let dispatched = consumer.await.unwrap();
        assert_eq!(dispatched, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_interleaved_producers_single_drain() {
        let queue = NotificationQueue::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let sink = counting_sink(Arc::clone(&counter));

        for id in 0..3u64 {
            queue.push(entry(
                &sink,
                ChannelName::table(arena_core::TableId::new(id)),
                json!({ "table": id }),
            ));
        }
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.dispatch(false, None).await, 3);
        assert!(queue.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
