//! The durable queue store: the single source of truth for events that have
//! not yet been successfully delivered.
//!
//! The whole queue is persisted as one JSON snapshot, rewritten on every
//! mutation (read-modify-write; there is no append log). Snapshots are
//! written atomically using the write-to-temp-then-rename pattern:
//!
//! 1. Write to `<path>.tmp`
//! 2. fsync the temp file
//! 3. Rename to `<path>`
//! 4. fsync the parent directory
//!
//! so a reader always sees either the old or the new snapshot, never a
//! partial write.
//!
//! # Invariants
//!
//! - A given event (by structural equality) appears at most once.
//! - An absent, empty, or corrupt snapshot reads as an empty queue, never
//!   an error: losing a corrupt file beats crashing on startup.
//! - Events are removed only after confirmed successful delivery, so a
//!   crash between buffer drain and removal never loses data.
//! - The stored queue is bounded: inserts beyond `max_stored_events` evict
//!   the oldest events first, so prolonged offline periods cannot grow the
//!   snapshot without limit.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::fsync::{fsync_dir, fsync_file};
use crate::types::Event;

/// Current snapshot schema version. Increment on breaking changes; a
/// mismatched version is treated as an empty queue, not an error.
pub const SCHEMA_VERSION: u32 = 1;

/// Default bound on the number of stored events.
pub const DEFAULT_MAX_STORED_EVENTS: usize = 1000;

/// Errors that can occur while writing the queue snapshot.
///
/// Reads never fail (corruption reads as empty); only writes surface errors,
/// and callers log and swallow them per the pipeline's bounded-loss policy.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The persisted snapshot wrapper.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedQueue {
    schema_version: u32,
    events: Vec<Event>,
}

/// Durable, deduplicating store of pending events.
///
/// All three operations (`insert`, `remove`, `read`) are serialized through
/// a single lock; contention is low and each operation is one small file
/// read plus at most one atomic write.
pub struct QueueStore {
    path: PathBuf,
    max_stored_events: usize,
    lock: Mutex<()>,
}

impl QueueStore {
    /// Creates a store persisting to the given snapshot path.
    ///
    /// The file is created lazily on first insert.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        QueueStore {
            path: path.into(),
            max_stored_events: DEFAULT_MAX_STORED_EVENTS,
            lock: Mutex::new(()),
        }
    }

    /// Sets the bound on stored events (oldest evicted first).
    pub fn with_max_stored_events(mut self, max: usize) -> Self {
        self.max_stored_events = max;
        self
    }

    /// Merges events into the persisted snapshot, deduplicating by
    /// structural equality, and writes the snapshot back.
    ///
    /// Inserting an event that is already stored is a no-op for that event,
    /// so repeated partial retries never duplicate data.
    pub async fn insert(&self, events: &[Event]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let stored = read_snapshot(&self.path);
        let merged = merge_events(stored, events, self.max_stored_events);
        debug!(stored = merged.len(), "persisting event queue");
        write_snapshot(&self.path, &merged)
    }

    /// Subtracts the given events (by structural equality) from the
    /// snapshot and writes it back.
    pub async fn remove(&self, events: &[Event]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut stored = read_snapshot(&self.path);
        stored.retain(|e| !events.contains(e));
        write_snapshot(&self.path, &stored)
    }

    /// Returns the current snapshot.
    ///
    /// An absent, empty, or corrupt snapshot reads as an empty queue.
    pub async fn read(&self) -> Vec<Event> {
        let _guard = self.lock.lock().await;
        read_snapshot(&self.path)
    }

    /// Clears the persisted queue.
    pub async fn purge(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        write_snapshot(&self.path, &[])
    }
}

/// Merges `new` into `existing`, skipping structural duplicates and
/// evicting the oldest events once the bound is exceeded.
fn merge_events(mut existing: Vec<Event>, new: &[Event], max: usize) -> Vec<Event> {
    for event in new {
        if !existing.contains(event) {
            existing.push(event.clone());
        }
    }
    if existing.len() > max {
        let excess = existing.len() - max;
        warn!(
            evicted = excess,
            max, "stored queue exceeded bound; evicting oldest events"
        );
        existing.drain(..excess);
    }
    existing
}

/// Reads the snapshot at `path`, treating any failure as an empty queue.
fn read_snapshot(path: &Path) -> Vec<Event> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(error = %e, path = %path.display(), "failed to read queue snapshot; treating as empty");
            return Vec::new();
        }
    };
    if bytes.is_empty() {
        return Vec::new();
    }
    match serde_json::from_slice::<PersistedQueue>(&bytes) {
        Ok(snapshot) if snapshot.schema_version == SCHEMA_VERSION => snapshot.events,
        Ok(snapshot) => {
            warn!(
                got = snapshot.schema_version,
                expected = SCHEMA_VERSION,
                "queue snapshot schema mismatch; treating as empty"
            );
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "corrupt queue snapshot; treating as empty");
            Vec::new()
        }
    }
}

/// Writes the snapshot atomically (temp file + fsync + rename + dir fsync).
fn write_snapshot(path: &Path, events: &[Event]) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let snapshot = PersistedQueue {
        schema_version: SCHEMA_VERSION,
        events: events.to_vec(),
    };
    let bytes = serde_json::to_vec_pretty(&snapshot)?;

    let tmp_path = tmp_path(path);
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        fsync_file(&file)?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fsync_dir(parent)?;
        }
    }

    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}
