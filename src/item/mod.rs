//! Work item and artifact definitions
//!
//! This module provides the two kinds of values producers emit:
//! - `WorkItem`: a unit of outbound work awaiting or undergoing execution
//! - `Artifact`: extracted data destined for the sinks
//!
//! along with target canonicalization and fingerprinting used for deduplication.

mod artifact;
mod fingerprint;
mod target;
mod work_item;

// Re-export main types
pub use artifact::Artifact;
pub use fingerprint::Fingerprint;
pub use target::parse_target;
pub use work_item::{Callback, Method, WorkItem, WorkItemBuilder};
