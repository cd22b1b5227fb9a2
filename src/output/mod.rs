//! Output module: artifact sinks and scheduler statistics
//!
//! This module handles:
//! - The `Sink` interface and the built-in console, file and SQLite sinks
//! - Fanning artifacts out to sinks on per-sink workers
//! - Recording and displaying scheduler statistics

mod console;
mod dispatch;
mod file;
mod sqlite_output;
pub mod stats;
mod traits;

pub use crate::config::SinkErrorPolicy;
pub use console::ConsoleSink;
pub use dispatch::SinkDispatcher;
pub use file::{FileSink, DEFAULT_PATH_TAG};
pub use sqlite_output::SqliteSink;
pub use stats::{print_statistics, SchedulerStats};
pub use traits::{Sink, SinkError, SinkResult};
