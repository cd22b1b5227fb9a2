//! Outcome routing
//!
//! Classifies the result of an execution and returns the item to the right
//! place: completed items go on to their producer, retryable failures go back
//! into the queue with a cool-down and fatal failures are abandoned. Every path
//! removes the item from the in-flight set exactly once.

use crate::crawler::fetcher::{FetchOutcome, Response, RetryKind};
use crate::crawler::scheduler::{InFlight, Scheduler};
use crate::item::WorkItem;
use crate::state::{HistoryEntry, HistoryOutcome, RequestState};
use tokio::time::Instant;

/// Result of an execution, reported by the dispatcher
#[derive(Debug)]
pub struct Completion {
    pub item_id: u64,
    pub token: u64,
    pub outcome: FetchOutcome,
}

/// What routing did with a completion
#[derive(Debug)]
pub enum RouteDecision {
    /// The producer callback should run with this response
    Completed { item: WorkItem, response: Response },

    /// Back in the queue, at the head when `front` is set
    Requeued { front: bool },

    /// Dropped for good
    Abandoned { reason: String },

    /// The execution lost its authority (stopped or re-dispatched); nothing changed
    Stale,
}

impl RouteDecision {
    /// Lifecycle state the item ended up in
    pub fn state(&self) -> Option<RequestState> {
        match self {
            Self::Completed { .. } => Some(RequestState::Completed),
            Self::Requeued { .. } => Some(RequestState::Retrying),
            Self::Abandoned { .. } => Some(RequestState::Abandoned),
            Self::Stale => None,
        }
    }
}

/// Checks that routing moved an in-flight item along a legal lifecycle step
fn note_transition(item_id: u64, decision: &RouteDecision) {
    let Some(state) = decision.state() else {
        return;
    };
    if !RequestState::InFlight.can_transition_to(state) {
        tracing::error!(item = item_id, %state, "Routing produced an illegal lifecycle step");
    } else if state.is_terminal() {
        tracing::debug!(item = item_id, %state, "Item settled");
    }
}

impl Scheduler {
    /// Routes one completion
    ///
    /// A completion whose token no longer matches the in-flight entry is
    /// discarded, which makes the outcome of a stopped execution a no-op.
    pub fn route(&mut self, completion: Completion, now: Instant) -> RouteDecision {
        let Completion {
            item_id,
            token,
            outcome,
        } = completion;

        let authoritative = matches!(self.in_flight.get(&item_id), Some(entry) if entry.token == token);
        if !authoritative {
            self.counters.stale += 1;
            tracing::debug!(item = item_id, token, "Discarding outcome of a stopped execution");
            return RouteDecision::Stale;
        }
        let Some(entry) = self.in_flight.remove(&item_id) else {
            tracing::error!(item = item_id, "In-flight entry vanished while routing");
            return RouteDecision::Stale;
        };

        let decision = match outcome {
            FetchOutcome::Success(response) => {
                self.counters.completed += 1;
                tracing::info!(
                    item = %entry.item.label(),
                    status = response.status,
                    elapsed_ms = now.saturating_duration_since(entry.started_at).as_millis() as u64,
                    "Completed"
                );
                self.log_history(
                    &entry,
                    HistoryOutcome::Completed {
                        status: response.status,
                    },
                    now,
                );
                RouteDecision::Completed {
                    item: entry.item,
                    response,
                }
            }
            FetchOutcome::Retryable(RetryKind::Timeout) => self.route_timeout(entry, now),
            FetchOutcome::Retryable(RetryKind::Generic { wait, jump_in_line }) => {
                self.counters.retried += 1;
                tracing::warn!(
                    item = %entry.item.label(),
                    wait_ms = wait.as_millis() as u64,
                    jump_in_line,
                    "Retrying"
                );
                self.log_history(
                    &entry,
                    HistoryOutcome::Retried {
                        reason: format!("retry after {}ms", wait.as_millis()),
                    },
                    now,
                );

                let mut item = entry.item;
                item.set_cool_down(wait, now);
                if jump_in_line {
                    self.queue.enqueue_priority(item);
                } else {
                    self.queue.enqueue(item);
                }
                RouteDecision::Requeued {
                    front: jump_in_line,
                }
            }
            FetchOutcome::Fatal(reason) => self.abandon(entry, reason, now),
        };
        note_transition(item_id, &decision);
        decision
    }

    fn route_timeout(&mut self, entry: InFlight, now: Instant) -> RouteDecision {
        let mut item = entry.item.clone();
        if !item.consume_timeout_retry() {
            return self.abandon(entry, "timeout retries exhausted".to_string(), now);
        }

        self.counters.retried += 1;
        tracing::warn!(
            item = %item.label(),
            retries_left = item.timeout_retries(),
            wait_ms = item.timeout_wait().as_millis() as u64,
            "Timed out, will retry"
        );
        self.log_history(&entry, HistoryOutcome::TimedOut, now);

        let wait = item.timeout_wait();
        item.set_cool_down(wait, now);
        self.queue.enqueue(item);
        RouteDecision::Requeued { front: false }
    }

    fn abandon(&mut self, entry: InFlight, reason: String, now: Instant) -> RouteDecision {
        self.counters.abandoned += 1;
        tracing::error!(item = %entry.item.label(), target = %entry.item.target(), %reason, "Abandoned");
        self.log_history(
            &entry,
            HistoryOutcome::Abandoned {
                reason: reason.clone(),
            },
            now,
        );
        RouteDecision::Abandoned { reason }
    }

    fn log_history(&mut self, entry: &InFlight, outcome: HistoryOutcome, now: Instant) {
        self.record_history(HistoryEntry {
            item_id: entry.item.id(),
            name: entry.item.name().to_string(),
            target: entry.item.target().to_string(),
            method: entry.item.method(),
            outcome,
            started_at: entry.started_wall,
            elapsed: now.saturating_duration_since(entry.started_at),
        });
    }
}
