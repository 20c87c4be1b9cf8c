/*!
 * Key Hashing
 *
 * Maps raw key bytes to a 64-bit value used for shard selection.
 *
 * Hash quality only affects load balance across shards. Two keys that land
 * in the same shard are still told apart by the shard's own map, so
 * collisions never affect correctness.
 */

/// Deterministic 64-bit hash over raw key bytes
///
/// Implementations must be pure: the same bytes always produce the same
/// value for the lifetime of a coordinator.
pub trait KeyHasher: Send + Sync {
    fn hash(&self, key: &[u8]) -> u64;

    /// Short name for diagnostics
    fn name(&self) -> &'static str;
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a
///
/// Order-sensitive, no allocation, no hidden state. The default hasher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fnv1a;

impl KeyHasher for Fnv1a {
    #[inline]
    fn hash(&self, key: &[u8]) -> u64 {
        key.iter().fold(FNV_OFFSET_BASIS, |h, &b| {
            (h ^ u64::from(b)).wrapping_mul(FNV_PRIME)
        })
    }

    fn name(&self) -> &'static str {
        "fnv1a"
    }
}

/// ahash with fixed seeds
///
/// Faster than FNV on long keys. Deterministic within a build; values may
/// differ between targets (AES vs fallback path), so never persist them.
#[derive(Clone)]
pub struct FixedAHasher {
    state: ahash::RandomState,
}

impl FixedAHasher {
    const SEEDS: [u64; 4] = [
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    ];

    pub fn new() -> Self {
        let [k0, k1, k2, k3] = Self::SEEDS;
        Self {
            state: ahash::RandomState::with_seeds(k0, k1, k2, k3),
        }
    }
}

impl Default for FixedAHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FixedAHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedAHasher").finish_non_exhaustive()
    }
}

impl KeyHasher for FixedAHasher {
    #[inline]
    fn hash(&self, key: &[u8]) -> u64 {
        self.state.hash_one(key)
    }

    fn name(&self) -> &'static str {
        "ahash-fixed"
    }
}
