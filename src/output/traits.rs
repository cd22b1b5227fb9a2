//! Sink traits and error types
//!
//! This module defines the trait interface for artifact sinks and
//! associated error types.

use crate::item::Artifact;
use thiserror::Error;

/// Errors that can occur while a sink saves an artifact
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Artifact is missing the '{0}' tag")]
    MissingTag(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Trait for artifact sink implementations ("pipelines")
///
/// Each registered sink gets its own serial worker, so `save` is never called
/// concurrently on the same sink and may block.
pub trait Sink: Send + Sync {
    /// Stable identity recorded in snapshots
    fn identity(&self) -> String;

    /// Whether this sink wants `artifact`
    fn acceptable(&self, _artifact: &Artifact) -> bool {
        true
    }

    /// Persists or displays `artifact`
    fn save(&self, artifact: &Artifact) -> SinkResult<()>;
}
