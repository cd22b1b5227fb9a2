//! Tidepool: a concurrent crawl scheduler
//!
//! This crate accepts a stream of outbound work items, bounds how many execute
//! concurrently, deduplicates repeated work, classifies fetch outcomes and feeds
//! newly discovered work back into itself while artifacts flow out to sinks.
//! Scheduler state can be snapshotted to disk and restored to resume a crawl.

pub mod config;
pub mod crawler;
pub mod item;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Tidepool operations
#[derive(Debug, Error)]
pub enum TidepoolError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Work item error: {0}")]
    Item(#[from] ItemError),

    #[error("Snapshot storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Sink error: {0}")]
    Sink(#[from] output::SinkError),

    #[error("Producer error: {0}")]
    Producer(#[from] crawler::ProducerError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Crawler must be built inside a tokio runtime")]
    NoRuntime,

    #[error("Scheduler has shut down")]
    ShutDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Errors raised while building a work item
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Failed to parse target: {0}")]
    Parse(#[from] ::url::ParseError),

    #[error("Invalid target scheme: {0}")]
    InvalidScheme(String),

    #[error("Unsupported method: {0}")]
    InvalidMethod(String),

    #[error("Work item needs a callback")]
    MissingCallback,
}

/// Result type alias for Tidepool operations
pub type Result<T> = std::result::Result<T, TidepoolError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for work item construction
pub type ItemResult<T> = std::result::Result<T, ItemError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{
    Admission, Crawler, FetchOutcome, Fetcher, HttpFetcher, LoadReport, Output, Producer,
    Response, RetryKind, SaveOptions, SubmitReport,
};
pub use item::{Artifact, Callback, Fingerprint, Method, WorkItem};
pub use output::{Sink, SinkDispatcher, SinkErrorPolicy};
pub use state::{RequestState, Tags};
