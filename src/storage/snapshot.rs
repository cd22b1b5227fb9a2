use crate::item::{Callback, Fingerprint, Method, WorkItem};
use crate::ItemResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// Version of the on-disk layout
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Restartable description of a queued work item
///
/// Carries everything needed to rebuild the item, with the continuation
/// reduced to a producer identity and a callback name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub target: String,
    pub method: Method,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: HashMap<String, Value>,
    pub timeout_ms: u64,
    pub timeout_wait_ms: u64,
    pub timeout_retries: u32,
    /// Cool-down left when the snapshot was taken
    #[serde(default)]
    pub cool_down_ms: u64,
    pub producer: String,
    pub callback: String,
    pub fingerprint: Fingerprint,
}

impl PendingRecord {
    /// Describes `item` as of `now`
    pub fn capture(item: &WorkItem, now: Instant) -> Self {
        Self {
            name: item.name().to_string(),
            target: item.target().to_string(),
            method: item.method(),
            payload: item.payload().clone(),
            headers: item.headers().clone(),
            tags: item.tags().clone(),
            timeout_ms: item.timeout().as_millis() as u64,
            timeout_wait_ms: item.timeout_wait().as_millis() as u64,
            timeout_retries: item.timeout_retries(),
            cool_down_ms: item.remaining_cool_down(now).as_millis() as u64,
            producer: item.producer().to_string(),
            callback: item.callback().name.clone(),
            fingerprint: item.fingerprint().clone(),
        }
    }

    /// Rebuilds a work item; the remaining cool-down restarts from now
    pub fn restore(self) -> ItemResult<WorkItem> {
        let expected = self.fingerprint;
        let item = WorkItem::builder(self.target, Callback::new(self.producer, self.callback))
            .name(self.name)
            .method(self.method)
            .payload(self.payload)
            .headers(self.headers)
            .tags(self.tags)
            .timeout(Duration::from_millis(self.timeout_ms))
            .timeout_wait(Duration::from_millis(self.timeout_wait_ms))
            .timeout_retries(self.timeout_retries)
            .cool_down(Duration::from_millis(self.cool_down_ms))
            .build()?;

        if item.fingerprint() != &expected {
            tracing::warn!(
                item = %item.label(),
                saved = expected.short(),
                computed = item.fingerprint().short(),
                "Restored item fingerprint differs from the saved one"
            );
        }
        Ok(item)
    }
}

/// Summary written next to the snapshot data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub crate_version: String,
    #[serde(default)]
    pub config_hash: Option<String>,
    pub pending: usize,
    pub fingerprints: usize,
    pub tags: usize,
    pub producers: Vec<String>,
    pub sinks: Vec<String>,
}

/// Point-in-time copy of scheduler state taken while quiescent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerSnapshot {
    /// Sorted
    pub fingerprints: Vec<Fingerprint>,
    /// Queue order
    pub pending: Vec<PendingRecord>,
    pub tags: HashMap<String, Value>,
    pub producers: Vec<String>,
    pub sinks: Vec<String>,
    pub config_hash: Option<String>,
}

impl SchedulerSnapshot {
    /// Builds the manifest describing this snapshot, stamped with the current time
    pub fn manifest(&self) -> SnapshotManifest {
        SnapshotManifest {
            format_version: SNAPSHOT_FORMAT_VERSION,
            saved_at: Utc::now(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: self.config_hash.clone(),
            pending: self.pending.len(),
            fingerprints: self.fingerprints.len(),
            tags: self.tags.len(),
            producers: self.producers.clone(),
            sinks: self.sinks.clone(),
        }
    }
}
