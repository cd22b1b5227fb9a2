use crate::item::Method;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// How a single execution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
    Completed { status: u16 },
    TimedOut,
    Retried { reason: String },
    Abandoned { reason: String },
}

impl HistoryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::TimedOut => "timed_out",
            Self::Retried { .. } => "retried",
            Self::Abandoned { .. } => "abandoned",
        }
    }
}

impl fmt::Display for HistoryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { status } => write!(f, "completed ({})", status),
            Self::TimedOut => write!(f, "timed out"),
            Self::Retried { reason } => write!(f, "retried: {}", reason),
            Self::Abandoned { reason } => write!(f, "abandoned: {}", reason),
        }
    }
}

/// One routed execution
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub item_id: u64,
    pub name: String,
    pub target: String,
    pub method: Method,
    pub outcome: HistoryOutcome,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Ring of recent executions
///
/// A limit of 0 keeps every entry.
#[derive(Debug, Clone)]
pub struct RequestHistory {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
    total: u64,
}

impl RequestHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit,
            total: 0,
        }
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        if self.limit > 0 && self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.total += 1;
    }

    /// Entries currently retained, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// The `n` most recent entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries ever recorded, including evicted ones
    pub fn total_recorded(&self) -> u64 {
        self.total
    }
}
