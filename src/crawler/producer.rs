//! Producer ("spider") interface
//!
//! Producers originate work items and artifacts and interpret responses. The
//! scheduler only depends on this trait; concrete crawl logic lives outside
//! the crate.

use crate::crawler::Response;
use crate::item::{Artifact, WorkItem};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by producer code
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("Unknown callback '{callback}' on producer {producer}")]
    UnknownCallback { producer: String, callback: String },

    #[error("Failed to parse response from {target}: {message}")]
    Parse { target: String, message: String },

    #[error("Work item error: {0}")]
    Item(#[from] crate::ItemError),

    #[error("{0}")]
    Other(String),
}

/// Result type for producer callbacks
pub type ProducerResult<T> = Result<T, ProducerError>;

/// Something a producer hands back to the scheduler
#[derive(Debug, Clone)]
pub enum Output {
    Request(WorkItem),
    Artifact(Artifact),
}

impl From<WorkItem> for Output {
    fn from(item: WorkItem) -> Self {
        Self::Request(item)
    }
}

impl From<Artifact> for Output {
    fn from(artifact: Artifact) -> Self {
        Self::Artifact(artifact)
    }
}

/// Crawl logic plugged into the scheduler
///
/// `parse` and `preparse` run on the routing task and may be called for many
/// responses over the life of a crawl; they must not block for long.
pub trait Producer: Send + Sync {
    /// Stable identity used to attribute work and to resolve it after a restore
    ///
    /// Two registered producers must never share an identity.
    fn identity(&self) -> String;

    /// Entry point of the crawl
    fn start(&self) -> ProducerResult<Vec<Output>>;

    /// Hook applied to every response before `parse`
    fn preparse(&self, response: Response, _item: &WorkItem) -> ProducerResult<Response> {
        Ok(response)
    }

    /// Handles a response for `item`; `callback` names the continuation the item was created with
    fn parse(
        &self,
        callback: &str,
        response: &Response,
        item: &WorkItem,
    ) -> ProducerResult<Vec<Output>>;
}

/// Producers registered with a crawler, keyed by identity
#[derive(Clone, Default)]
pub struct ProducerRegistry {
    producers: HashMap<String, Arc<dyn Producer>>,
    order: Vec<String>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a producer; a second producer with the same identity replaces the first
    pub fn register(&mut self, producer: Arc<dyn Producer>) {
        let identity = producer.identity();
        if self.producers.insert(identity.clone(), producer).is_some() {
            tracing::warn!(producer = %identity, "Replacing producer with duplicate identity");
        } else {
            self.order.push(identity);
        }
    }

    pub fn get(&self, identity: &str) -> Option<Arc<dyn Producer>> {
        self.producers.get(identity).cloned()
    }

    /// Identities in registration order
    pub fn identities(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Producers in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Producer>> {
        self.order.iter().filter_map(|id| self.producers.get(id))
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}

impl std::fmt::Debug for ProducerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerRegistry")
            .field("producers", &self.order)
            .finish()
    }
}
