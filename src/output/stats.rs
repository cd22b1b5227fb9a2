//! Scheduler statistics
//!
//! This module provides the counters snapshot returned by `Crawler::stats`
//! and a plain-text renderer for it.

use crate::state::HistoryEntry;

/// Scheduler statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Items waiting in the admission queue
    pub pending: usize,

    /// Items currently executing
    pub in_flight: usize,

    /// Configured concurrency cap
    pub max_concurrency: usize,

    /// Largest in-flight set observed
    pub peak_in_flight: usize,

    /// Fingerprints recorded by the dedup index
    pub fingerprints: usize,

    /// Executions started
    pub dispatched: u64,

    pub completed: u64,
    pub retried: u64,
    pub abandoned: u64,

    /// Submissions dropped as repeats
    pub duplicates: u64,

    /// Outcomes discarded because their execution had been stopped
    pub stale: u64,

    pub paused: bool,
    pub quiescent: bool,
}

impl SchedulerStats {
    /// Share of finished executions that completed, in percent
    pub fn success_rate(&self) -> f64 {
        let finished = self.completed + self.abandoned;
        if finished == 0 {
            0.0
        } else {
            (self.completed as f64 / finished as f64) * 100.0
        }
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
/// * `recent` - Recent executions to list after the counters
pub fn print_statistics(stats: &SchedulerStats, recent: &[HistoryEntry]) {
    println!("=== Scheduler Statistics ===\n");

    println!("Queue:");
    println!("  Pending: {}", stats.pending);
    println!(
        "  In flight: {} / {} (peak {})",
        stats.in_flight, stats.max_concurrency, stats.peak_in_flight
    );
    println!("  Fingerprints: {}", stats.fingerprints);
    println!(
        "  State: {}{}",
        if stats.paused { "paused" } else { "running" },
        if stats.quiescent { ", quiescent" } else { "" }
    );
    println!();

    println!("Executions:");
    println!("  Dispatched: {}", stats.dispatched);
    println!("  Completed: {}", stats.completed);
    println!("  Retried: {}", stats.retried);
    println!("  Abandoned: {}", stats.abandoned);
    println!("  Duplicates dropped: {}", stats.duplicates);
    if stats.stale > 0 {
        println!("  Stale outcomes discarded: {}", stats.stale);
    }
    println!();

    if !recent.is_empty() {
        println!("Recent ({}):", recent.len());
        for entry in recent {
            println!(
                "  {} {} {} -> {} ({}ms)",
                entry.started_at.format("%H:%M:%S"),
                entry.method,
                entry.target,
                entry.outcome,
                entry.elapsed.as_millis()
            );
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} finished executions completed)",
        stats.success_rate(),
        stats.completed,
        stats.completed + stats.abandoned
    );
}
