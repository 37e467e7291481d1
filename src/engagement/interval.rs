//! Adaptive heartbeat interval.
//!
//! Heartbeats fire frequently at the start of a session and back off as the
//! session ages, so long reads do not generate a constant stream of events.
//! The interval is a pure function of session start time and the current
//! time, injected behind a trait so tests can pin a fixed cadence.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Added to elapsed session time before applying the backoff proportion,
/// which puts the very first interval at 10.5 seconds instead of zero.
pub const OFFSET: Duration = Duration::from_secs(35);

/// Fraction of (elapsed + offset) used as the next interval.
pub const BACKOFF_PROPORTION: f64 = 0.3;

/// Hard cap on the interval, reached after roughly 3.3 hours of engagement.
pub const MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Computes the wait before the next heartbeat tick.
pub trait IntervalCalculator: Send + Sync {
    fn interval(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> Duration;
}

/// The production calculator: `min(MAX, (elapsed + OFFSET) * PROPORTION)`.
pub struct BackoffIntervalCalculator;

impl IntervalCalculator for BackoffIntervalCalculator {
    fn interval(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        heartbeat_interval(start, now)
    }
}

/// `interval = min(MAX_INTERVAL, (elapsed + OFFSET) * BACKOFF_PROPORTION)`.
///
/// Non-decreasing in `now` for a fixed `start`; a `now` before `start`
/// is treated as zero elapsed time.
pub fn heartbeat_interval(start: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let elapsed_millis = (now - start).num_milliseconds().max(0) as f64;
    let backed_off = (elapsed_millis + OFFSET.as_millis() as f64) * BACKOFF_PROPORTION;
    Duration::from_millis(backed_off as u64).min(MAX_INTERVAL)
}
