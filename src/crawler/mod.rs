//! Crawler module: the scheduling core and its collaborators
//!
//! This module contains the core scheduling logic, including:
//! - Deduplicated admission of work items into an ordered queue
//! - Dispatch under a concurrency cap and a global request interval
//! - Outcome classification with timeout budgets and cool-downs
//! - The fetch and producer interfaces the scheduler depends on
//! - The running `Crawler` with pause, stop, save and load

mod coordinator;
mod dedup;
mod fetcher;
mod producer;
mod queue;
mod router;
mod scheduler;

pub use coordinator::{Crawler, CrawlerBuilder, LoadReport, SaveOptions, SubmitReport};
pub use dedup::DedupIndex;
pub use fetcher::{build_http_client, FetchOutcome, Fetcher, HttpFetcher, Response, RetryKind};
pub use producer::{Output, Producer, ProducerError, ProducerRegistry, ProducerResult};
pub use queue::AdmissionQueue;
pub use router::{Completion, RouteDecision};
pub use scheduler::{Admission, Dispatch, ItemInfo, Scheduler};
