//! Scheduler core: admission, dispatch bookkeeping and the concurrency bound
//!
//! This module handles:
//! - Gating submissions through the dedup index into the admission queue
//! - Selecting ready items under the concurrency cap and the global request interval
//! - Tracking the in-flight set and the authority token of each execution
//! - Cooperative stop of in-flight items
//!
//! The core is synchronous and owns every collection. The async crawler keeps
//! it behind a single mutex, which makes each compound mutation atomic.

use crate::config::SchedulerConfig;
use crate::crawler::dedup::DedupIndex;
use crate::crawler::queue::AdmissionQueue;
use crate::item::{Fingerprint, WorkItem};
use crate::output::SchedulerStats;
use crate::state::{HistoryEntry, RequestHistory, RequestState};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::time::Instant;

/// An item handed to the dispatcher for execution
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub item: WorkItem,
    /// Authority token of this execution; outcomes carrying an older token are discarded
    pub token: u64,
}

/// Result of submitting a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Duplicate,
}

/// Display row for a queued or in-flight item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInfo {
    pub id: u64,
    pub name: String,
    pub target: String,
    pub producer: String,
    pub state: RequestState,
}

impl ItemInfo {
    fn from_item(item: &WorkItem, state: RequestState) -> Self {
        Self {
            id: item.id(),
            name: item.name().to_string(),
            target: item.target().to_string(),
            producer: item.producer().to_string(),
            state,
        }
    }
}

#[derive(Debug)]
pub(crate) struct InFlight {
    pub(crate) item: WorkItem,
    pub(crate) token: u64,
    pub(crate) started_at: Instant,
    pub(crate) started_wall: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Counters {
    pub(crate) dispatched: u64,
    pub(crate) completed: u64,
    pub(crate) retried: u64,
    pub(crate) abandoned: u64,
    pub(crate) duplicates: u64,
    pub(crate) stale: u64,
}

/// Scheduler state aggregate
///
/// Invariants:
/// - an item is in exactly one of {queue, in-flight set} while alive
/// - `in_flight.len() <= max_concurrency`; the count only grows in
///   [`Scheduler::take_ready`] and only shrinks in routing or [`Scheduler::stop`]
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    pub(crate) queue: AdmissionQueue,
    pub(crate) in_flight: HashMap<u64, InFlight>,
    dedup: DedupIndex,
    pub(crate) history: RequestHistory,
    next_dispatch_at: Option<Instant>,
    paused: bool,
    next_token: u64,
    unrouted: usize,
    peak_in_flight: usize,
    pub(crate) counters: Counters,
}

impl Scheduler {
    /// Creates an empty scheduler
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            queue: AdmissionQueue::new(),
            in_flight: HashMap::new(),
            dedup: DedupIndex::new(config.distinct),
            history: RequestHistory::new(config.history_limit),
            next_dispatch_at: None,
            paused: config.start_paused,
            next_token: 0,
            unrouted: 0,
            peak_in_flight: 0,
            counters: Counters::default(),
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Gates `item` through the dedup index and appends it to the queue
    ///
    /// Duplicates are not an error; they are logged and dropped.
    pub fn admit(&mut self, item: WorkItem) -> Admission {
        if !self.dedup.admit(item.fingerprint()) {
            self.counters.duplicates += 1;
            tracing::info!(
                item = %item.label(),
                target = %item.target(),
                fingerprint = item.fingerprint().short(),
                "Repeated request dropped"
            );
            return Admission::Duplicate;
        }

        tracing::trace!(item = %item.label(), target = %item.target(), "Admitted");
        self.queue.enqueue(item);
        Admission::Admitted
    }

    /// Moves ready items into the in-flight set
    ///
    /// Returns nothing while paused. Otherwise walks the queue in admission
    /// order, skipping cooling items, until the concurrency cap is reached or
    /// the global request interval blocks further dispatch.
    pub fn take_ready(&mut self, now: Instant) -> Vec<Dispatch> {
        let mut batch = Vec::new();
        if self.paused {
            return batch;
        }

        let max = self.config.max_concurrency as usize;
        let interval = self.config.request_interval();

        while self.in_flight.len() < max {
            if matches!(self.next_dispatch_at, Some(at) if now < at) {
                break;
            }
            let Some(item) = self.queue.dequeue_if_ready(now) else {
                break;
            };

            self.next_token += 1;
            let token = self.next_token;
            tracing::debug!(item = %item.label(), target = %item.target(), token, "Dispatching");

            self.in_flight.insert(
                item.id(),
                InFlight {
                    item: item.clone(),
                    token,
                    started_at: now,
                    started_wall: Utc::now(),
                },
            );
            self.counters.dispatched += 1;
            self.peak_in_flight = self.peak_in_flight.max(self.in_flight.len());
            batch.push(Dispatch { item, token });

            self.next_dispatch_at = if interval.is_zero() {
                None
            } else {
                Some(now + interval)
            };
        }

        batch
    }

    /// Stops an in-flight item and puts it back at the head of the queue
    ///
    /// The running transfer is not interrupted; its outcome will carry a token
    /// that no longer matches and routing will discard it. Releases the slot.
    pub fn stop(&mut self, id: u64) -> bool {
        let Some(entry) = self.in_flight.remove(&id) else {
            tracing::debug!(item = id, "Stop requested for item that is not in flight");
            return false;
        };
        tracing::info!(item = %entry.item.label(), "Stopped in-flight item, requeued at head");
        self.queue.enqueue_priority(entry.item);
        true
    }

    /// Stops every in-flight item, keeping their dispatch order at the head of the queue
    pub fn stop_all(&mut self) -> usize {
        let mut entries: Vec<InFlight> = self.in_flight.drain().map(|(_, e)| e).collect();
        entries.sort_by(|a, b| b.token.cmp(&a.token));
        let stopped = entries.len();
        for entry in entries {
            self.queue.enqueue_priority(entry.item);
        }
        if stopped > 0 {
            tracing::info!(stopped, "Stopped all in-flight items");
        }
        stopped
    }

    /// Records that a finished execution is waiting for the router
    pub fn mark_unrouted(&mut self) {
        self.unrouted += 1;
    }

    /// Records that the router is done with an execution, including its producer callback
    pub fn mark_routed(&mut self) {
        if self.unrouted == 0 {
            tracing::error!("Routed more executions than were reported finished");
            return;
        }
        self.unrouted -= 1;
    }

    /// No work in flight and no results awaiting routing
    pub fn is_quiescent(&self) -> bool {
        self.in_flight.is_empty() && self.unrouted == 0
    }

    /// Quiescent with an empty queue: nothing left to do
    pub fn is_idle(&self) -> bool {
        self.is_quiescent() && self.queue.is_empty()
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Largest in-flight set observed so far
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }

    pub fn is_in_flight(&self, id: u64) -> bool {
        self.in_flight.contains_key(&id)
    }

    /// Position of a queued item, 0 being the head
    pub fn queue_position(&self, id: u64) -> Option<usize> {
        self.queue.position(id)
    }

    /// Queued items in queue order (cloned)
    pub fn pending_items(&self) -> Vec<WorkItem> {
        self.queue.iter().cloned().collect()
    }

    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        self.dedup.sorted()
    }

    pub fn has_fingerprint(&self, fingerprint: &Fingerprint) -> bool {
        self.dedup.contains(fingerprint)
    }

    /// Restores saved state
    ///
    /// Pending items go through the dedup index like any submission, so loading
    /// the same snapshot twice does not duplicate queue entries. The remaining
    /// fingerprints are merged afterwards.
    pub fn restore(&mut self, items: Vec<WorkItem>, fingerprints: Vec<Fingerprint>) -> (usize, usize) {
        let mut admitted = 0;
        let mut skipped = 0;
        for item in items {
            match self.admit(item) {
                Admission::Admitted => admitted += 1,
                Admission::Duplicate => skipped += 1,
            }
        }
        self.dedup.extend(fingerprints);
        (admitted, skipped)
    }

    pub fn pending_info(&self) -> Vec<ItemInfo> {
        self.queue
            .iter()
            .map(|item| ItemInfo::from_item(item, RequestState::Pending))
            .collect()
    }

    pub fn in_flight_info(&self) -> Vec<ItemInfo> {
        let mut entries: Vec<&InFlight> = self.in_flight.values().collect();
        entries.sort_by_key(|e| e.token);
        entries
            .into_iter()
            .map(|e| ItemInfo::from_item(&e.item, RequestState::InFlight))
            .collect()
    }

    pub fn history(&self) -> &RequestHistory {
        &self.history
    }

    pub(crate) fn record_history(&mut self, entry: HistoryEntry) {
        self.history.record(entry);
    }

    /// Current counters and sizes
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            pending: self.queue.len(),
            in_flight: self.in_flight.len(),
            max_concurrency: self.config.max_concurrency as usize,
            peak_in_flight: self.peak_in_flight,
            fingerprints: self.dedup.len(),
            dispatched: self.counters.dispatched,
            completed: self.counters.completed,
            retried: self.counters.retried,
            abandoned: self.counters.abandoned,
            duplicates: self.counters.duplicates,
            stale: self.counters.stale,
            paused: self.paused,
            quiescent: self.is_quiescent(),
        }
    }
}
