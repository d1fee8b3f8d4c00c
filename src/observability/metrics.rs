//! Engine counters
//!
//! Plain atomic counters, shared process-wide through the repository.
//! Reads are racy snapshots, which is fine for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the document store engine
#[derive(Debug, Default)]
pub struct Metrics {
    /// Successful commits
    commits: AtomicU64,
    /// Commits rejected with an optimistic conflict
    conflicts: AtomicU64,
    /// Invalidation messages published
    invalidations_sent: AtomicU64,
    /// Invalidation messages applied to a local cache
    invalidations_applied: AtomicU64,
    /// Event bundles fully processed by async listeners
    bundles_processed: AtomicU64,
    /// Bundles that exhausted retries for at least one listener
    dead_letters: AtomicU64,
}

impl Metrics {
    /// Create a zeroed metrics block
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidations_sent(&self, count: u64) {
        self.invalidations_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_invalidation_applied(&self) {
        self.invalidations_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bundle_processed(&self) {
        self.bundles_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.dead_letters.fetch_add(1, Ordering::Relaxed);
    }

    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    pub fn invalidations_sent(&self) -> u64 {
        self.invalidations_sent.load(Ordering::Relaxed)
    }

    pub fn invalidations_applied(&self) -> u64 {
        self.invalidations_applied.load(Ordering::Relaxed)
    }

    pub fn bundles_processed(&self) -> u64 {
        self.bundles_processed.load(Ordering::Relaxed)
    }

    pub fn dead_letters(&self) -> u64 {
        self.dead_letters.load(Ordering::Relaxed)
    }
}
