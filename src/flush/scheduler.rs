//! Repeating flush timer.
//!
//! The scheduler owns no business logic: each tick is a message on an mpsc
//! channel, and the pipeline's driver task turns received ticks into flush
//! cycles. It exists so the process does no periodic work while the queue
//! is empty; the coordinator stops it on empty and the buffer path restarts
//! it when new events arrive.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default period between flush cycles.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Start/stop-able fixed-interval timer emitting ticks on a channel.
///
/// `start` and `stop` are idempotent. Stopping does not cancel a flush
/// cycle already in flight; it only prevents future ticks.
pub struct FlushScheduler {
    interval: Duration,
    ticks: mpsc::Sender<()>,
    running: Mutex<Option<CancellationToken>>,
}

impl FlushScheduler {
    /// Creates a scheduler together with the receiving end of its tick
    /// channel. The caller owns the receiver and drives flushes from it.
    pub fn new(interval: Duration) -> (Arc<Self>, mpsc::Receiver<()>) {
        // Capacity 1: a tick that arrives while a flush is still running
        // is dropped, since that flush already covers the queue.
        let (tx, rx) = mpsc::channel(1);
        let scheduler = Arc::new(FlushScheduler {
            interval,
            ticks: tx,
            running: Mutex::new(None),
        });
        (scheduler, rx)
    }

    /// Starts the timer. A no-op if already running; the existing timer is
    /// neither reset nor duplicated.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }
        debug!(interval = ?self.interval, "flush timer started");
        let token = CancellationToken::new();
        *running = Some(token.clone());

        let ticks = self.ticks.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Swallow the immediate first tick; the first flush happens one
            // full interval after start.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = ticker.tick() => {
                        match ticks.try_send(()) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(())) => {
                                debug!("flush already in flight; skipping tick");
                            }
                            Err(mpsc::error::TrySendError::Closed(())) => return,
                        }
                    }
                }
            }
        });
    }

    /// Stops the timer. A no-op if not running.
    pub fn stop(&self) {
        if let Some(token) = self.running.lock().take() {
            debug!("flush timer stopped");
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}
