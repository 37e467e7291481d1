//! Durable storage for the pending event queue.
//!
//! Events waiting for delivery are persisted as a single JSON snapshot so
//! that a crash, restart, or prolonged offline period never loses tracked
//! data. The snapshot is rewritten atomically on every mutation (temp file
//! + rename + fsync + dir fsync) and corruption is tolerated by reading as
//! an empty queue.

pub mod fsync;
pub mod store;

pub use fsync::{fsync_dir, fsync_file};
pub use store::{
    DEFAULT_MAX_STORED_EVENTS, QueueStore, Result, SCHEMA_VERSION, StoreError,
};
