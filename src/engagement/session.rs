//! Engagement sessions: the adaptive loop that synthesizes heartbeat events
//! while a user stays on a piece of content.
//!
//! A session owns a base event template and a background loop. Each
//! iteration asks the interval calculator for the next delay, sleeps, and
//! emits a copy of the template carrying the engaged time since the last
//! tick (`inc`) and the cumulative session total (`tt`). Stopping cancels
//! the loop and emits one final tick for the partially elapsed interval, so
//! no engaged time is lost.
//!
//! Sessions are restartable: `start` after `stop` resumes accumulation into
//! the same total, which is how a paused video resumes without losing its
//! engaged-time history.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::interval::IntervalCalculator;
use crate::buffer::InMemoryBuffer;
use crate::clock::Clock;
use crate::types::{Event, VideoIdentity};

/// Where emitted heartbeat ticks go. The pipeline points this at the
/// ingestion buffer; tests substitute a recorder.
#[async_trait]
pub trait TickSink: Send + Sync {
    async fn enqueue(&self, event: Event);
}

#[async_trait]
impl TickSink for InMemoryBuffer {
    async fn enqueue(&self, event: Event) {
        self.add(event).await;
    }
}

/// Timing state shared between the loop task and the stop path.
struct TickState {
    start: DateTime<Utc>,
    latest_delay: Duration,
    next_scheduled: DateTime<Utc>,
    total_millis: u64,
}

struct SessionInner {
    base: Event,
    identity: Option<VideoIdentity>,
    sink: Arc<dyn TickSink>,
    calculator: Arc<dyn IntervalCalculator>,
    clock: Arc<dyn Clock>,
    state: Mutex<TickState>,
}

struct RunningLoop {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// One engagement session (article or video).
pub struct EngagementSession {
    inner: Arc<SessionInner>,
    control: Mutex<Option<RunningLoop>>,
}

impl EngagementSession {
    /// Creates a stopped session around a base event template.
    ///
    /// `identity` is set for video sessions and drives resume-vs-restart
    /// decisions; article sessions pass `None`.
    pub fn new(
        base: Event,
        identity: Option<VideoIdentity>,
        sink: Arc<dyn TickSink>,
        calculator: Arc<dyn IntervalCalculator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        EngagementSession {
            inner: Arc::new(SessionInner {
                base,
                identity,
                sink,
                calculator,
                clock,
                state: Mutex::new(TickState {
                    start: now,
                    latest_delay: Duration::ZERO,
                    next_scheduled: now,
                    total_millis: 0,
                }),
            }),
            control: Mutex::new(None),
        }
    }

    /// Begins (or resumes) the heartbeat loop. A no-op if already running.
    ///
    /// The cumulative total survives stop/start cycles; only the backoff
    /// clock resets.
    pub fn start(&self) {
        let mut control = self.control.lock();
        if control.is_some() {
            return;
        }
        let now = self.inner.clock.now();
        {
            let mut state = self.inner.state.lock();
            state.start = now;
            state.latest_delay = Duration::ZERO;
            state.next_scheduled = now;
        }
        debug!(url = %self.inner.base.url, "engagement session started");

        let token = CancellationToken::new();
        let inner = Arc::clone(&self.inner);
        let loop_token = token.clone();
        let task = tokio::spawn(async move { inner.run(loop_token).await });
        *control = Some(RunningLoop { token, task });
    }

    /// Stops the loop and emits one final tick covering the partially
    /// elapsed interval. Does not return until that tick has been handed
    /// to the sink. A no-op if not running.
    pub async fn stop(&self) {
        let running = self.control.lock().take();
        let Some(running) = running else {
            return;
        };
        running.token.cancel();
        // The loop task exits without emitting once cancelled; ignore a
        // panic in the dead task rather than poisoning the stop path.
        let _ = running.task.await;
        self.inner.emit_tick().await;
        debug!(url = %self.inner.base.url, "engagement session stopped");
    }

    pub fn is_running(&self) -> bool {
        self.control.lock().is_some()
    }

    /// Cumulative engaged time across all start/stop cycles, in millis.
    pub fn total_millis(&self) -> u64 {
        self.inner.state.lock().total_millis
    }

    /// True when this is a video session for exactly the given video.
    pub fn matches_video(&self, identity: &VideoIdentity) -> bool {
        self.inner.identity.as_ref() == Some(identity)
    }
}

impl SessionInner {
    async fn run(self: Arc<Self>, token: CancellationToken) {
        loop {
            let now = self.clock.now();
            let start = self.state.lock().start;
            let delay = self.calculator.interval(start, now);
            {
                let mut state = self.state.lock();
                state.latest_delay = delay;
                state.next_scheduled = now + TimeDelta::milliseconds(delay.as_millis() as i64);
            }
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {
                    self.emit_tick().await;
                }
            }
        }
    }

    /// Emits one heartbeat tick.
    ///
    /// `inc = latest_delay + (now - next_scheduled)` covers both cases: a
    /// tick firing on schedule (the correction is just jitter) and the
    /// final tick on stop (the negative correction shrinks the increment
    /// to the actually elapsed portion of the interval).
    async fn emit_tick(&self) {
        let now = self.clock.now();
        let event = {
            let mut state = self.state.lock();
            let correction = (now - state.next_scheduled).num_milliseconds();
            let inc_millis = (state.latest_delay.as_millis() as i64 + correction).max(0) as u64;
            state.total_millis += inc_millis;

            let mut event = self.base.clone();
            event.data.ts = now.timestamp_millis();
            // Whole seconds on the wire; tt carries the exact milliseconds.
            event.inc = Some(inc_millis / 1000);
            event.tt = Some(state.total_millis);
            event
        };
        self.sink.enqueue(event).await;
    }
}
