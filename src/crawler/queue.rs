//! Admission queue of not-yet-started work items
//!
//! Items are kept in admission order. Retries may be pushed to the head, and
//! an item that is cooling down is skipped rather than blocking the ready
//! items behind it.

use crate::item::WorkItem;
use std::collections::VecDeque;
use tokio::time::Instant;

/// Ordered backlog of pending work items
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    items: VecDeque<WorkItem>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item to the tail
    pub fn enqueue(&mut self, item: WorkItem) {
        self.items.push_back(item);
    }

    /// Inserts an item at the head, ahead of the backlog
    pub fn enqueue_priority(&mut self, item: WorkItem) {
        self.items.push_front(item);
    }

    /// Removes and returns the first item whose cool-down has elapsed
    ///
    /// Scans in admission order, so a cooling item at the head does not hide
    /// ready items behind it.
    pub fn dequeue_if_ready(&mut self, now: Instant) -> Option<WorkItem> {
        let position = self.items.iter().position(|item| item.is_ready(now))?;
        self.items.remove(position)
    }

    /// Earliest instant at which some cooling item becomes ready
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.items.iter().filter_map(WorkItem::ready_at).min()
    }

    /// Whether any item could be dispatched at `now`
    pub fn has_ready(&self, now: Instant) -> bool {
        self.items.iter().any(|item| item.is_ready(now))
    }

    /// Removes the item with `id`, wherever it sits
    pub fn remove(&mut self, id: u64) -> Option<WorkItem> {
        let position = self.items.iter().position(|item| item.id() == id)?;
        self.items.remove(position)
    }

    /// Position of the item with `id`, 0 being the head
    pub fn position(&self, id: u64) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn front(&self) -> Option<&WorkItem> {
        self.items.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
