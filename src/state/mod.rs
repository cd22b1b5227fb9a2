//! State module for tracking scheduler progress
//!
//! This module provides the per-item lifecycle state, the shared tag map and
//! the request history log.
//!
//! # Components
//!
//! - `RequestState`: Lifecycle of a work item (pending, in flight, retrying, completed, abandoned)
//! - `Tags`: Free-form shared key-value map exposed to producers and sinks
//! - `RequestHistory`: Ring of recently routed executions for observability

mod history;
mod request_state;
mod tags;

// Re-export main types
pub use history::{HistoryEntry, HistoryOutcome, RequestHistory};
pub use request_state::RequestState;
pub use tags::Tags;
