//! Low-level fsync operations for durability.
//!
//! The queue snapshot must survive process death and power loss, so writes
//! fsync both the file and its containing directory.
//!
//! # Why Directory fsync?
//!
//! On POSIX systems, creating or renaming a file updates the directory
//! entry. Without fsync on the directory, this entry may not survive a power
//! loss even if the file contents were synced.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Syncs a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory to disk, ensuring directory entries are durable.
///
/// Required after renaming the snapshot into place; without it a renamed
/// file might revert to its old name after power loss.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}
