//! Engaged-time heartbeats.
//!
//! While a user stays on an article or keeps a video playing, an
//! [`EngagementSession`] loop emits heartbeat events at an adaptively
//! growing interval, each carrying the engaged time since the previous tick
//! and the running session total. The interval math lives in [`interval`];
//! the loop and its stop-with-final-flush semantics live in [`session`].

pub mod interval;
pub mod session;

pub use interval::{
    BACKOFF_PROPORTION, BackoffIntervalCalculator, IntervalCalculator, MAX_INTERVAL, OFFSET,
    heartbeat_interval,
};
pub use session::{EngagementSession, TickSink};
