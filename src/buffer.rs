//! In-memory staging buffer between event producers and the durable queue.
//!
//! Tracking calls append to this buffer and return immediately; a background
//! drain loop moves staged events into the [`QueueStore`] once per second.
//! Producers therefore never block on disk IO, at the cost of a bounded
//! window (one drain interval) of events that a crash can lose.
//!
//! Adding an event notifies an [`EventSink`] so the owning pipeline can
//! wake the flush scheduler as soon as there is work to deliver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::persistence::QueueStore;
use crate::types::Event;

/// How often staged events are moved to durable storage.
pub const DRAIN_INTERVAL: Duration = Duration::from_secs(1);

/// Callback invoked whenever an event lands in the buffer.
///
/// The pipeline uses this to start the flush scheduler lazily, so the
/// process does no periodic work while nothing is being tracked.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_event_added(&self);
}

/// Staging buffer with a periodic drain into the durable queue.
pub struct InMemoryBuffer {
    staged: Mutex<Vec<Event>>,
    store: Arc<QueueStore>,
    sink: Arc<dyn EventSink>,
}

impl InMemoryBuffer {
    pub fn new(store: Arc<QueueStore>, sink: Arc<dyn EventSink>) -> Self {
        InMemoryBuffer {
            staged: Mutex::new(Vec::new()),
            store,
            sink,
        }
    }

    /// Stages an event and notifies the sink.
    ///
    /// Returns once the event is in memory; durability follows at the next
    /// drain tick.
    pub async fn add(&self, event: Event) {
        {
            let mut staged = self.staged.lock().await;
            staged.push(event);
            debug!(staged = staged.len(), "event staged");
        }
        self.sink.on_event_added().await;
    }

    /// Spawns the drain loop.
    ///
    /// The loop runs until `shutdown` is cancelled, then performs one final
    /// drain so staged events are not lost on an orderly stop.
    pub fn spawn_drain_loop(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let buffer = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DRAIN_INTERVAL);
            // The first tick of a tokio interval completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        buffer.drain().await;
                        debug!("buffer drain loop stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        buffer.drain().await;
                    }
                }
            }
        })
    }

    /// Moves all staged events into the durable queue.
    ///
    /// The staging lock is held across the store insert so that a concurrent
    /// `add` cannot interleave between the snapshot write and the clear. If
    /// the insert fails the staged events are dropped; the loss is bounded
    /// to one drain interval and is preferable to unbounded memory growth.
    async fn drain(&self) {
        let mut staged = self.staged.lock().await;
        if staged.is_empty() {
            return;
        }
        match self.store.insert(&staged).await {
            Ok(()) => {
                debug!(drained = staged.len(), "buffer drained to durable queue");
            }
            Err(e) => {
                warn!(error = %e, dropped = staged.len(), "failed to persist staged events; dropping");
            }
        }
        staged.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingSink {
        notified: AtomicUsize,
    }

    impl CountingSink {
        fn new() -> Arc<Self> {
            Arc::new(CountingSink {
                notified: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.notified.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventSink for CountingSink {
        async fn on_event_added(&self) {
            self.notified.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn event(n: i64) -> Event {
        Event::new(
            Action::Pageview,
            format!("https://example.com/{n}"),
            "",
            "example.com",
            n,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn drain_moves_events_to_store() {
        let dir = tempdir().unwrap();
        let store = Arc::new(QueueStore::new(dir.path().join("queue.json")));
        let sink = CountingSink::new();
        let buffer = Arc::new(InMemoryBuffer::new(Arc::clone(&store), sink));

        let shutdown = CancellationToken::new();
        let handle = buffer.spawn_drain_loop(shutdown.clone());

        buffer.add(event(1)).await;
        buffer.add(event(2)).await;
        assert!(store.read().await.is_empty());

        tokio::time::sleep(DRAIN_INTERVAL * 2).await;
        assert_eq!(store.read().await.len(), 2);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn add_notifies_sink_each_time() {
        let dir = tempdir().unwrap();
        let store = Arc::new(QueueStore::new(dir.path().join("queue.json")));
        let sink = CountingSink::new();
        let buffer = InMemoryBuffer::new(store, Arc::clone(&sink) as Arc<dyn EventSink>);

        buffer.add(event(1)).await;
        buffer.add(event(2)).await;
        buffer.add(event(3)).await;

        assert_eq!(sink.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_performs_final_drain() {
        let dir = tempdir().unwrap();
        let store = Arc::new(QueueStore::new(dir.path().join("queue.json")));
        let sink = CountingSink::new();
        let buffer = Arc::new(InMemoryBuffer::new(Arc::clone(&store), sink));

        let shutdown = CancellationToken::new();
        let handle = buffer.spawn_drain_loop(shutdown.clone());

        buffer.add(event(1)).await;

        // Stop before the first tick fires; the event must still land.
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(store.read().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_adds_deduplicate_in_store() {
        let dir = tempdir().unwrap();
        let store = Arc::new(QueueStore::new(dir.path().join("queue.json")));
        let sink = CountingSink::new();
        let buffer = Arc::new(InMemoryBuffer::new(Arc::clone(&store), sink));

        let shutdown = CancellationToken::new();
        let handle = buffer.spawn_drain_loop(shutdown.clone());

        buffer.add(event(1)).await;
        tokio::time::sleep(DRAIN_INTERVAL * 2).await;
        buffer.add(event(1)).await;
        tokio::time::sleep(DRAIN_INTERVAL * 2).await;

        assert_eq!(store.read().await.len(), 1);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
