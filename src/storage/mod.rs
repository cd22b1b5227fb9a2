//! Storage module for persisting scheduler snapshots
//!
//! This module handles:
//! - Reducing queued work items to restartable records
//! - Writing and reading the snapshot directory
//! - Snapshot manifests used by `tidepool inspect`

mod directory;
mod snapshot;
mod traits;

pub use directory::{
    DirectoryStore, FINGERPRINTS_FILE, MANIFEST_FILE, PENDING_FILE, PRODUCERS_FILE, SINKS_FILE,
    TAGS_FILE,
};
pub use snapshot::{PendingRecord, SchedulerSnapshot, SnapshotManifest, SNAPSHOT_FORMAT_VERSION};
pub use traits::{SnapshotStore, StorageError, StorageResult};

use std::path::Path;

/// Opens the snapshot store for a directory
///
/// The directory does not need to exist yet; saving creates it.
pub fn open_store(path: &Path) -> DirectoryStore {
    DirectoryStore::new(path)
}
