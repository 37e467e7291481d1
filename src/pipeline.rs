//! Pipeline wiring and lifecycle.
//!
//! [`Pipeline`] owns every moving part: the durable queue store, the
//! in-memory buffer with its drain task, the flush scheduler and the driver
//! task that turns its ticks into flush cycles, and at most one article
//! engagement session plus one video engagement session. Collaborators
//! (transport, connectivity, clock, interval calculator) are injected, so
//! the whole pipeline runs deterministically under test.
//!
//! A pipeline is an explicitly constructed, explicitly owned value. The
//! [`Pipeline::init`] entry point adds a process-wide init-once guard for
//! hosts that want singleton semantics; [`Pipeline::new`] stays available
//! for direct construction.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::buffer::{EventSink, InMemoryBuffer};
use crate::clock::{Clock, SystemClock};
use crate::engagement::{BackoffIntervalCalculator, EngagementSession, IntervalCalculator, TickSink};
use crate::flush::{
    ConnectivityOracle, DEFAULT_FLUSH_INTERVAL, FlushCoordinator, FlushScheduler, Transport,
};
use crate::persistence::{DEFAULT_MAX_STORED_EVENTS, QueueStore};
use crate::types::{Event, VideoIdentity};

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Errors surfaced by pipeline construction.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// [`Pipeline::init`] was called a second time in this process.
    #[error("pipeline already initialized")]
    AlreadyInitialized,
}

/// Static configuration for a pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Site id events are attributed to by default.
    pub site_id: String,

    /// Path of the durable queue snapshot file.
    pub queue_path: PathBuf,

    /// Period of the flush timer.
    pub flush_interval: Duration,

    /// Bound on the durable queue (oldest evicted first).
    pub max_stored_events: usize,
}

impl PipelineConfig {
    pub fn new(site_id: impl Into<String>, queue_path: impl Into<PathBuf>) -> Self {
        PipelineConfig {
            site_id: site_id.into(),
            queue_path: queue_path.into(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_stored_events: DEFAULT_MAX_STORED_EVENTS,
        }
    }

    /// Like [`PipelineConfig::new`], with environment overrides.
    ///
    /// Reads `BEACON_FLUSH_INTERVAL_SECS` for the flush interval and
    /// `BEACON_MAX_STORED_EVENTS` for the queue bound. Other values use
    /// defaults.
    pub fn from_env(site_id: impl Into<String>, queue_path: impl Into<PathBuf>) -> Self {
        let flush_secs = std::env::var("BEACON_FLUSH_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_FLUSH_INTERVAL.as_secs());
        let max_stored = std::env::var("BEACON_MAX_STORED_EVENTS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_STORED_EVENTS);

        PipelineConfig {
            flush_interval: Duration::from_secs(flush_secs),
            max_stored_events: max_stored,
            ..Self::new(site_id, queue_path)
        }
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_max_stored_events(mut self, max: usize) -> Self {
        self.max_stored_events = max;
        self
    }
}

/// Outcome of a [`Pipeline::track_video`] call, telling the caller whether
/// a new video view began (and a `videostart` event should be emitted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoTracking {
    /// A fresh session began for this video.
    Started,
    /// The existing session for this video continues or resumes.
    Resumed,
    /// The call was rejected (empty url) and nothing changed.
    Ignored,
}

/// Starts the flush timer whenever an event lands in the buffer.
struct SchedulerStarter {
    scheduler: Arc<FlushScheduler>,
}

#[async_trait]
impl EventSink for SchedulerStarter {
    async fn on_event_added(&self) {
        self.scheduler.start();
    }
}

/// The assembled telemetry pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<QueueStore>,
    buffer: Arc<InMemoryBuffer>,
    scheduler: Arc<FlushScheduler>,
    coordinator: Arc<FlushCoordinator>,
    calculator: Arc<dyn IntervalCalculator>,
    clock: Arc<dyn Clock>,
    article_session: tokio::sync::Mutex<Option<EngagementSession>>,
    video_session: tokio::sync::Mutex<Option<EngagementSession>>,
    shutdown: CancellationToken,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Wires and starts a pipeline with explicit collaborators.
    ///
    /// Spawns the buffer drain task and the flush driver task. If the
    /// persisted queue is non-empty (events left over from a previous
    /// process), the flush timer starts immediately so they get delivered
    /// without waiting for new activity.
    pub async fn new(
        config: PipelineConfig,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn ConnectivityOracle>,
        clock: Arc<dyn Clock>,
        calculator: Arc<dyn IntervalCalculator>,
    ) -> Arc<Self> {
        let store = Arc::new(
            QueueStore::new(&config.queue_path).with_max_stored_events(config.max_stored_events),
        );
        let (scheduler, mut ticks) = FlushScheduler::new(config.flush_interval);
        let coordinator = Arc::new(FlushCoordinator::new(
            Arc::clone(&store),
            transport,
            connectivity,
            Arc::clone(&scheduler),
        ));
        let buffer = Arc::new(InMemoryBuffer::new(
            Arc::clone(&store),
            Arc::new(SchedulerStarter {
                scheduler: Arc::clone(&scheduler),
            }),
        ));

        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();
        tasks.push(buffer.spawn_drain_loop(shutdown.child_token()));

        let driver_coordinator = Arc::clone(&coordinator);
        let driver_token = shutdown.child_token();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = driver_token.cancelled() => return,
                    tick = ticks.recv() => match tick {
                        Some(()) => driver_coordinator.flush(false).await,
                        None => return,
                    },
                }
            }
        }));

        let leftover = store.read().await.len();
        if leftover > 0 {
            info!(events = leftover, "persisted queue non-empty at startup; starting flush timer");
            scheduler.start();
        }

        Arc::new(Pipeline {
            config,
            store,
            buffer,
            scheduler,
            coordinator,
            calculator,
            clock,
            article_session: tokio::sync::Mutex::new(None),
            video_session: tokio::sync::Mutex::new(None),
            shutdown,
            tasks: parking_lot::Mutex::new(tasks),
        })
    }

    /// Constructs the process-wide pipeline with production collaborators.
    ///
    /// Errors if called more than once in the lifetime of the process.
    pub async fn init(
        config: PipelineConfig,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn ConnectivityOracle>,
    ) -> Result<Arc<Self>, PipelineError> {
        if INITIALIZED.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::AlreadyInitialized);
        }
        Ok(Pipeline::new(
            config,
            transport,
            connectivity,
            Arc::new(SystemClock),
            Arc::new(BackoffIntervalCalculator),
        )
        .await)
    }

    /// The site id this pipeline attributes events to by default.
    pub fn site_id(&self) -> &str {
        &self.config.site_id
    }

    /// The ingestion entry point, used by direct producers and by
    /// engagement sessions alike. Returns once the event is staged.
    pub async fn enqueue(&self, event: Event) {
        self.buffer.add(event).await;
    }

    /// Runs a flush cycle immediately, outside the timer cadence.
    pub async fn flush_now(&self, skip_network: bool) {
        self.coordinator.flush(skip_network).await;
    }

    /// Begins engaged-time tracking for an article.
    ///
    /// `base` is the heartbeat template; each tick is a copy of it with the
    /// timing fields filled in. Any running article session is stopped
    /// first, flushing its partial interval. An empty `url` is rejected
    /// with a logged no-op.
    #[instrument(skip(self, base), fields(url = %base.url))]
    pub async fn start_engagement(&self, base: Event) {
        if base.url.is_empty() {
            warn!("engagement requires a non-empty url; ignoring");
            return;
        }
        let mut slot = self.article_session.lock().await;
        if let Some(existing) = slot.take() {
            existing.stop().await;
        }
        let session = EngagementSession::new(
            base,
            None,
            Arc::clone(&self.buffer) as Arc<dyn TickSink>,
            Arc::clone(&self.calculator),
            Arc::clone(&self.clock),
        );
        session.start();
        *slot = Some(session);
    }

    /// Stops article engagement, flushing the partial interval. A no-op if
    /// no article session is running.
    pub async fn stop_engagement(&self) {
        if let Some(session) = self.article_session.lock().await.take() {
            session.stop().await;
        }
    }

    pub async fn engagement_is_active(&self) -> bool {
        self.article_session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.is_running())
    }

    /// Begins or resumes engaged-time tracking for a video.
    ///
    /// If the current video session is for the same video, it resumes (or
    /// keeps running) with its accumulated total intact. A different video
    /// stops the old session first, partial flush included, and starts
    /// fresh. The return value tells the caller whether this is a new view.
    #[instrument(skip(self, heartbeat_base, identity), fields(link = %identity.link))]
    pub async fn track_video(&self, heartbeat_base: Event, identity: VideoIdentity) -> VideoTracking {
        if heartbeat_base.url.is_empty() {
            warn!("video tracking requires a non-empty url; ignoring");
            return VideoTracking::Ignored;
        }
        let mut slot = self.video_session.lock().await;
        if let Some(existing) = slot.as_ref() {
            if existing.matches_video(&identity) {
                if !existing.is_running() {
                    debug!(link = %identity.link, "resuming paused video session");
                    existing.start();
                }
                return VideoTracking::Resumed;
            }
        }
        if let Some(previous) = slot.take() {
            previous.stop().await;
        }
        debug!(link = %identity.link, "starting video session");
        let session = EngagementSession::new(
            heartbeat_base,
            Some(identity),
            Arc::clone(&self.buffer) as Arc<dyn TickSink>,
            Arc::clone(&self.calculator),
            Arc::clone(&self.clock),
        );
        session.start();
        *slot = Some(session);
        VideoTracking::Started
    }

    /// Pauses video engagement, flushing the partial interval but keeping
    /// the session identity so the same video can resume.
    pub async fn pause_video(&self) {
        if let Some(session) = self.video_session.lock().await.as_ref() {
            session.stop().await;
        }
    }

    /// Stops video engagement and forgets the session entirely; tracking
    /// the same video again starts a new view.
    pub async fn reset_video(&self) {
        if let Some(session) = self.video_session.lock().await.take() {
            session.stop().await;
        }
    }

    pub async fn video_is_active(&self) -> bool {
        self.video_session
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.is_running())
    }

    /// Whether the flush timer is currently running.
    pub fn flush_timer_is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Snapshot of the durable queue, for diagnostics.
    pub async fn stored_events(&self) -> Vec<Event> {
        self.store.read().await
    }

    /// Graceful shutdown: stops both engagement sessions (with their final
    /// partial-interval ticks), stops the flush timer, and drains the
    /// buffer so those ticks are persisted before the tasks exit.
    pub async fn shutdown(&self) {
        self.stop_engagement().await;
        self.reset_video().await;
        self.scheduler.stop();
        self.shutdown.cancel();
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        debug!("pipeline shut down");
    }
}
