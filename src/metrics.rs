//! Lightweight per-store metrics.
//!
//! Thread-safe atomic counters, grouped by subsystem:
//! - Commit pipeline (commits, empty batches, failures, observer failures)
//! - Iterator pool
//! - Snapshot registry
//! - Administrative ops (reset, compaction)

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct StoreMetrics {
    // ----- Commit pipeline -----
    commits: AtomicU64,
    empty_commits: AtomicU64,
    failed_commits: AtomicU64,
    pre_commit_failures: AtomicU64,
    post_commit_failures: AtomicU64,

    // ----- Iterator pool -----
    iterators_created: AtomicU64,
    iterators_reused: AtomicU64,
    iterators_pooled: AtomicU64,
    iterators_discarded: AtomicU64,

    // ----- Snapshots -----
    snapshots_opened: AtomicU64,
    snapshots_released: AtomicU64,
    snapshots_force_closed: AtomicU64,

    // ----- Admin -----
    resets: AtomicU64,
    failed_resets: AtomicU64,
    compactions: AtomicU64,
    failed_compactions: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub commits: u64,
    pub empty_commits: u64,
    pub failed_commits: u64,
    pub pre_commit_failures: u64,
    pub post_commit_failures: u64,

    pub iterators_created: u64,
    pub iterators_reused: u64,
    pub iterators_pooled: u64,
    pub iterators_discarded: u64,

    pub snapshots_opened: u64,
    pub snapshots_released: u64,
    pub snapshots_force_closed: u64,

    pub resets: u64,
    pub failed_resets: u64,
    pub compactions: u64,
    pub failed_compactions: u64,
}

impl MetricsSnapshot {
    /// Share of borrows served from the pool.
    pub fn iterator_reuse_ratio(&self) -> f64 {
        let total = self.iterators_created + self.iterators_reused;
        if total == 0 {
            0.0
        } else {
            self.iterators_reused as f64 / total as f64
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[inline]
fn bump(c: &AtomicU64, n: u64) {
    c.fetch_add(n, Ordering::Relaxed);
}

impl StoreMetrics {
    // ----- Recorders (commit) -----
    pub fn record_commit(&self) {
        bump(&self.commits, 1);
    }
    pub fn record_empty_commit(&self) {
        bump(&self.empty_commits, 1);
    }
    pub fn record_commit_failed(&self) {
        bump(&self.failed_commits, 1);
    }
    pub fn record_pre_commit_failures(&self, n: usize) {
        bump(&self.pre_commit_failures, n as u64);
    }
    pub fn record_post_commit_failures(&self, n: usize) {
        bump(&self.post_commit_failures, n as u64);
    }

    // ----- Recorders (iterators) -----
    pub fn record_iterator_created(&self) {
        bump(&self.iterators_created, 1);
    }
    pub fn record_iterator_reused(&self) {
        bump(&self.iterators_reused, 1);
    }
    pub fn record_iterator_pooled(&self) {
        bump(&self.iterators_pooled, 1);
    }
    pub fn record_iterators_discarded(&self, n: usize) {
        bump(&self.iterators_discarded, n as u64);
    }

    // ----- Recorders (snapshots) -----
    pub fn record_snapshot_opened(&self) {
        bump(&self.snapshots_opened, 1);
    }
    pub fn record_snapshot_released(&self) {
        bump(&self.snapshots_released, 1);
    }
    pub fn record_snapshots_force_closed(&self, n: usize) {
        bump(&self.snapshots_force_closed, n as u64);
    }

    // ----- Recorders (admin) -----
    pub fn record_reset(&self, ok: bool) {
        if ok {
            bump(&self.resets, 1);
        } else {
            bump(&self.failed_resets, 1);
        }
    }
    pub fn record_compaction(&self, ok: bool) {
        if ok {
            bump(&self.compactions, 1);
        } else {
            bump(&self.failed_compactions, 1);
        }
    }

    // ----- Snapshot / Reset -----
    pub fn snapshot(&self) -> MetricsSnapshot {
        let ld = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            commits: ld(&self.commits),
            empty_commits: ld(&self.empty_commits),
            failed_commits: ld(&self.failed_commits),
            pre_commit_failures: ld(&self.pre_commit_failures),
            post_commit_failures: ld(&self.post_commit_failures),

            iterators_created: ld(&self.iterators_created),
            iterators_reused: ld(&self.iterators_reused),
            iterators_pooled: ld(&self.iterators_pooled),
            iterators_discarded: ld(&self.iterators_discarded),

            snapshots_opened: ld(&self.snapshots_opened),
            snapshots_released: ld(&self.snapshots_released),
            snapshots_force_closed: ld(&self.snapshots_force_closed),

            resets: ld(&self.resets),
            failed_resets: ld(&self.failed_resets),
            compactions: ld(&self.compactions),
            failed_compactions: ld(&self.failed_compactions),
        }
    }

    pub fn reset(&self) {
        for c in [
            &self.commits,
            &self.empty_commits,
            &self.failed_commits,
            &self.pre_commit_failures,
            &self.post_commit_failures,
            &self.iterators_created,
            &self.iterators_reused,
            &self.iterators_pooled,
            &self.iterators_discarded,
            &self.snapshots_opened,
            &self.snapshots_released,
            &self.snapshots_force_closed,
            &self.resets,
            &self.failed_resets,
            &self.compactions,
            &self.failed_compactions,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}
