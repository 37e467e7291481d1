//! One flush cycle: read the queue, deliver it as a single batch, reconcile.
//!
//! The coordinator never surfaces errors to its caller. A failed delivery
//! leaves the queue untouched and the scheduler running, so the next tick
//! retries; the fixed-interval timer is the retry mechanism, with no
//! attempt counting or backoff on the network leg.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::scheduler::FlushScheduler;
use super::transport::{ConnectivityOracle, Transport};
use crate::persistence::QueueStore;
use crate::types::Event;

/// Orchestrates flush cycles against the durable queue.
pub struct FlushCoordinator {
    store: Arc<QueueStore>,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn ConnectivityOracle>,
    scheduler: Arc<FlushScheduler>,
    in_flight: Mutex<()>,
}

impl FlushCoordinator {
    pub fn new(
        store: Arc<QueueStore>,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn ConnectivityOracle>,
        scheduler: Arc<FlushScheduler>,
    ) -> Self {
        FlushCoordinator {
            store,
            transport,
            connectivity,
            scheduler,
            in_flight: Mutex::new(()),
        }
    }

    /// Runs one flush cycle. At most one cycle is in flight at a time;
    /// concurrent calls queue behind the in-flight lock.
    ///
    /// With `skip_network` set the batch is treated as delivered without
    /// calling the transport (local debug mode).
    #[instrument(skip(self))]
    pub async fn flush(&self, skip_network: bool) {
        let _guard = self.in_flight.lock().await;

        if !self.connectivity.is_reachable() {
            debug!("endpoint unreachable; deferring flush");
            return;
        }

        // The batch is exactly this snapshot. Events inserted while the
        // network call is in flight stay queued for the next cycle.
        let batch = self.store.read().await;
        if batch.is_empty() {
            debug!("queue empty; stopping flush timer");
            self.scheduler.stop();
            return;
        }

        let payload = match batch_payload(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to serialize batch; leaving queue for next cycle");
                return;
            }
        };

        if skip_network {
            info!(events = batch.len(), "network skipped; discarding batch");
            self.remove_delivered(&batch).await;
            return;
        }

        match self.transport.send(&payload).await {
            Ok(()) => {
                info!(events = batch.len(), "batch delivered");
                self.remove_delivered(&batch).await;
            }
            Err(e) => {
                warn!(error = %e, events = batch.len(), "batch delivery failed; retrying next tick");
            }
        }
    }

    async fn remove_delivered(&self, batch: &[Event]) {
        if let Err(e) = self.store.remove(batch).await {
            warn!(error = %e, "failed to remove delivered events from queue");
        }
    }
}

/// Serializes a batch as `{"events": [...]}` preserving queue order.
fn batch_payload(events: &[Event]) -> serde_json::Result<String> {
    #[derive(Serialize)]
    struct Batch<'a> {
        events: &'a [Event],
    }
    serde_json::to_string(&Batch { events })
}
