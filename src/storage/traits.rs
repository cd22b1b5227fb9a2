//! Storage traits and error types
//!
//! This module defines the trait interface for snapshot backends and
//! associated error types.

use crate::storage::{SchedulerSnapshot, SnapshotManifest};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while saving or loading a snapshot
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed {file} at line {line}: {message}")]
    Malformed {
        file: String,
        line: usize,
        message: String,
    },

    #[error("Snapshot file not found: {0}")]
    MissingFile(PathBuf),

    #[error("Snapshot directory not found: {0}")]
    MissingDirectory(PathBuf),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for snapshot backend implementations
///
/// A store holds exactly one snapshot; writing replaces whatever was there.
pub trait SnapshotStore {
    /// Persists a snapshot
    ///
    /// # Returns
    ///
    /// The manifest that was written alongside the data
    fn write_snapshot(&self, snapshot: &SchedulerSnapshot) -> StorageResult<SnapshotManifest>;

    /// Reads back a snapshot
    ///
    /// Fails when any part of the snapshot is missing.
    fn read_snapshot(&self) -> StorageResult<SchedulerSnapshot>;

    /// Reads only the manifest
    fn read_manifest(&self) -> StorageResult<SnapshotManifest>;

    /// Where the snapshot lives
    fn location(&self) -> &Path;
}
