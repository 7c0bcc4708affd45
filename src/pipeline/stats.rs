//! Run counters shared between the main loop and the workers.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Generations launched by the reset protocol.
    pub generations: u64,
    /// Results acknowledged by the remote validator.
    pub validated: u64,
    /// Stage failures reported by workers.
    pub transform_failures: u64,
    /// Requests pushed back onto the retry stream.
    pub requeued: u64,
    /// Successful results refused by an already closed generation sink.
    pub rejected: u64,
    /// Orphaned results forwarded to validation on reset.
    pub orphans_recovered: u64,
    /// Orphaned results discarded on reset.
    pub orphans_dropped: u64,
}

impl StatsSnapshot {
    /// Fraction of attempts that ended in a transform failure.
    pub fn failure_rate(&self) -> f64 {
        let attempts = self.validated + self.transform_failures;
        if attempts == 0 {
            return 0.0;
        }
        self.transform_failures as f64 / attempts as f64
    }
}

/// Shared state for tracking pipeline statistics.
#[derive(Debug, Default)]
pub struct PipelineStats {
    generations: AtomicU64,
    validated: AtomicU64,
    transform_failures: AtomicU64,
    requeued: AtomicU64,
    rejected: AtomicU64,
    orphans_recovered: AtomicU64,
    orphans_dropped: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_generation(&self) {
        self.generations.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_validated(&self) {
        self.validated.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_transform_failure(&self) {
        self.transform_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_requeued(&self) {
        self.requeued.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_orphans(&self, count: usize, recovered: bool) {
        let counter = if recovered {
            &self.orphans_recovered
        } else {
            &self.orphans_dropped
        };
        counter.fetch_add(count as u64, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            generations: self.generations.load(Ordering::SeqCst),
            validated: self.validated.load(Ordering::SeqCst),
            transform_failures: self.transform_failures.load(Ordering::SeqCst),
            requeued: self.requeued.load(Ordering::SeqCst),
            rejected: self.rejected.load(Ordering::SeqCst),
            orphans_recovered: self.orphans_recovered.load(Ordering::SeqCst),
            orphans_dropped: self.orphans_dropped.load(Ordering::SeqCst),
        }
    }
}
