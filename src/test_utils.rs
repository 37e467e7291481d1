//! Shared test doubles for the injected collaborators.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::engagement::{IntervalCalculator, TickSink};
use crate::flush::{ConnectivityOracle, Transport, TransportError};
use crate::types::{Action, Event};

/// A pageview event with a distinguishing timestamp and url.
pub fn test_event(n: i64) -> Event {
    Event::new(
        Action::Pageview,
        format!("https://example.com/{n}"),
        "",
        "example.com",
        n,
    )
}

/// Transport that records payloads and fails on demand.
pub struct MockTransport {
    sent: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(MockTransport {
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Payloads of successful sends, in delivery order.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, payload: &str) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Network("injected failure".into()));
        }
        self.sent.lock().unwrap().push(payload.to_string());
        Ok(())
    }
}

/// Connectivity oracle with a switchable answer.
pub struct FakeConnectivity {
    reachable: AtomicBool,
}

impl FakeConnectivity {
    pub fn reachable() -> Arc<Self> {
        Arc::new(FakeConnectivity {
            reachable: AtomicBool::new(true),
        })
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

impl ConnectivityOracle for FakeConnectivity {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Clock reading tokio's paused test time, anchored at the epoch.
///
/// Under `#[tokio::test(start_paused = true)]` this yields exact virtual
/// timestamps: 30 seconds of `tokio::time::sleep` is exactly 30 000 ms.
pub struct PausedClock {
    origin: tokio::time::Instant,
}

impl PausedClock {
    pub fn new() -> Arc<Self> {
        Arc::new(PausedClock {
            origin: tokio::time::Instant::now(),
        })
    }
}

impl Clock for PausedClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.origin.elapsed();
        DateTime::from_timestamp_millis(elapsed.as_millis() as i64)
            .unwrap_or_else(|| DateTime::from_timestamp_millis(0).unwrap())
    }
}

/// Interval calculator pinned to a constant cadence.
pub struct FixedInterval(pub Duration);

impl IntervalCalculator for FixedInterval {
    fn interval(&self, _start: DateTime<Utc>, _now: DateTime<Utc>) -> Duration {
        self.0
    }
}

/// Tick sink that records emitted heartbeat events.
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl TickSink for RecordingSink {
    async fn enqueue(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}
