/*!
 * Shard Router
 *
 * Fixed, power-of-two array of shards plus the mask used to pick one.
 * Built once, never resized: shard selection is `hash(key) & mask`.
 */

use crate::core::errors::{ConfigError, ConfigResult};
use crate::core::hash::KeyHasher;
use crate::core::limits::MAX_SHARDS;

/// Effective shard count for a requested count
///
/// Rounds up to the next power of two. `0` and anything above `MAX_SHARDS`
/// are rejected.
pub fn effective_shard_count(requested: usize) -> ConfigResult<usize> {
    if requested == 0 {
        return Err(ConfigError::InvalidShardCount(requested));
    }
    if requested > MAX_SHARDS {
        return Err(ConfigError::TooManyShards {
            requested,
            max: MAX_SHARDS,
        });
    }
    Ok(requested.next_power_of_two())
}

/// Immutable shard array with hash-and-mask routing
pub struct ShardRouter<S, H> {
    shards: Box<[S]>,
    mask: u64,
    requested: usize,
    hasher: H,
}

impl<S, H: KeyHasher> ShardRouter<S, H> {
    /// Allocate `effective_shard_count(requested)` shards, built by `make`
    /// from their index
    pub fn new<F>(requested: usize, hasher: H, make: F) -> ConfigResult<Self>
    where
        F: FnMut(usize) -> S,
    {
        let count = effective_shard_count(requested)?;
        let shards: Box<[S]> = (0..count).map(make).collect();

        tracing::debug!(
            requested,
            effective = count,
            hasher = hasher.name(),
            "shard router initialized"
        );

        Ok(Self {
            shards,
            mask: (count - 1) as u64,
            requested,
            hasher,
        })
    }

    /// Shard index for `key`
    #[inline]
    pub fn index_of(&self, key: &[u8]) -> usize {
        (self.hasher.hash(key) & self.mask) as usize
    }

    #[inline]
    pub fn shard_for(&self, key: &[u8]) -> &S {
        &self.shards[self.index_of(key)]
    }

    #[inline]
    pub fn shards(&self) -> &[S] {
        &self.shards
    }

    /// Effective shard count (a power of two)
    #[inline]
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Always false: a router has at least one shard
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    #[inline]
    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// Shard count the caller asked for, before rounding
    #[inline]
    pub fn requested(&self) -> usize {
        self.requested
    }

    #[inline]
    pub fn hasher(&self) -> &H {
        &self.hasher
    }
}
