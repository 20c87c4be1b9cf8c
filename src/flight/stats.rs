/*!
 * Flight Statistics
 * Relaxed atomic counters per group, serializable snapshots for reporting
 */

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by one group
///
/// Diagnostics only: counters are updated with `Relaxed` ordering and a
/// snapshot is not a consistent cut across counters.
#[derive(Debug, Default)]
pub(crate) struct FlightCounters {
    executions: AtomicU64,
    shared: AtomicU64,
    panics: AtomicU64,
    timeouts: AtomicU64,
    abandoned: AtomicU64,
    forgotten: AtomicU64,
}

impl FlightCounters {
    #[inline]
    pub(crate) fn record_execution(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_shared(&self) {
        self.shared.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_forgotten(&self) {
        self.forgotten.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, in_flight: usize) -> GroupStats {
        GroupStats {
            executions: self.executions.load(Ordering::Relaxed),
            shared: self.shared.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            forgotten: self.forgotten.load(Ordering::Relaxed),
            in_flight: in_flight as u64,
        }
    }
}

/// Point-in-time statistics for one group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    /// Work functions actually invoked
    pub executions: u64,
    /// Calls that attached to an existing flight instead of executing
    pub shared: u64,
    /// Work functions that panicked
    pub panics: u64,
    /// Waiters that gave up before the outcome arrived
    pub timeouts: u64,
    /// Async initiators dropped before finishing
    pub abandoned: u64,
    /// Records removed through `forget`
    pub forgotten: u64,
    /// Records currently in the map
    pub in_flight: u64,
}

impl GroupStats {
    /// Total calls that received an outcome or timed out
    pub fn calls(&self) -> u64 {
        self.executions + self.shared
    }

    /// Fraction of calls served by another caller's execution
    pub fn shared_ratio(&self) -> f64 {
        let calls = self.calls();
        if calls == 0 {
            return 0.0;
        }
        self.shared as f64 / calls as f64
    }
}

impl AddAssign for GroupStats {
    fn add_assign(&mut self, rhs: Self) {
        self.executions += rhs.executions;
        self.shared += rhs.shared;
        self.panics += rhs.panics;
        self.timeouts += rhs.timeouts;
        self.abandoned += rhs.abandoned;
        self.forgotten += rhs.forgotten;
        self.in_flight += rhs.in_flight;
    }
}

/// Statistics for a whole coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    pub requested_shards: usize,
    pub shard_count: usize,
    pub hasher: String,
    pub totals: GroupStats,
    pub per_shard: Vec<GroupStats>,
}

impl CoordinatorStats {
    pub(crate) fn collect<I>(requested_shards: usize, hasher: &str, shards: I) -> Self
    where
        I: IntoIterator<Item = GroupStats>,
    {
        let per_shard: Vec<GroupStats> = shards.into_iter().collect();
        let mut totals = GroupStats::default();
        for stats in &per_shard {
            totals += *stats;
        }
        Self {
            requested_shards,
            shard_count: per_shard.len(),
            hasher: hasher.to_string(),
            totals,
            per_shard,
        }
    }

    /// Spread between the busiest and idlest shard, by executions
    pub fn execution_skew(&self) -> u64 {
        let max = self.per_shard.iter().map(|s| s.executions).max().unwrap_or(0);
        let min = self.per_shard.iter().map(|s| s.executions).min().unwrap_or(0);
        max - min
    }
}
