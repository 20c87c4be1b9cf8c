/*!
 * Shard Count Selection
 *
 * CPU-topology-aware shard counts for coordinators whose callers don't want
 * to pick a number themselves.
 *
 * # Design Rationale
 *
 * - **Power-of-2 shards**: shard selection is `hash & (n - 1)`
 * - **CPU-proportional scaling**: more cores means more concurrent callers
 *   contending for the same shard locks
 * - **Contention multipliers**: heavier fan-in gets more shards per core
 */

use super::limits::{MAX_PROFILE_SHARDS, MIN_PROFILE_SHARDS};

/// Hardware-aware shard configuration (pure functions)
pub struct ShardManager;

impl ShardManager {
    /// Available parallelism, or 8 if it can't be detected
    #[inline]
    pub fn cpu_count() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or_else(|_| {
                tracing::warn!("Failed to detect CPU count, defaulting to 8");
                8
            })
    }

    /// Shard count for a workload profile
    ///
    /// Always a power of two within `MIN_PROFILE_SHARDS..=MAX_PROFILE_SHARDS`.
    #[inline]
    pub fn shards(profile: WorkloadProfile) -> usize {
        Self::shards_with_multiplier(profile.multiplier())
    }

    /// Shard count with a custom per-core multiplier
    #[inline]
    pub fn shards_with_multiplier(multiplier: usize) -> usize {
        let calculated = Self::cpu_count()
            .saturating_mul(multiplier.max(1))
            .checked_next_power_of_two()
            .unwrap_or(MAX_PROFILE_SHARDS);
        calculated.clamp(MIN_PROFILE_SHARDS, MAX_PROFILE_SHARDS)
    }
}

/// How much concurrent fan-in a coordinator expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadProfile {
    /// Request fan-in from many threads (RPC clients, cache fronts)
    /// Shard count: 4x CPU cores
    HighContention,

    /// Moderate fan-in
    /// Shard count: 2x CPU cores
    MediumContention,

    /// Occasional duplicate calls
    /// Shard count: 1x CPU cores
    LowContention,
}

impl WorkloadProfile {
    #[inline]
    const fn multiplier(self) -> usize {
        match self {
            Self::HighContention => 4,
            Self::MediumContention => 2,
            Self::LowContention => 1,
        }
    }
}
