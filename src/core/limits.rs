/*!
 * Limits and Constants
 *
 * Shard bounds, defaults and environment variable names, grouped by concern.
 */

// =============================================================================
// SHARD SIZING
// =============================================================================

/// Default requested shard count
/// Used when neither the caller nor the environment picks one
pub const DEFAULT_SHARDS: usize = 16;

/// Maximum requested shard count (64K)
/// Each shard is a cache-line aligned lock + map; past this the memory cost
/// buys nothing
pub const MAX_SHARDS: usize = 1 << 16;

/// Lower clamp for CPU-derived shard counts
/// Avoids degenerate single-lock coordinators on 1-2 core machines
pub const MIN_PROFILE_SHARDS: usize = 8;

/// Upper clamp for CPU-derived shard counts
pub const MAX_PROFILE_SHARDS: usize = 512;

/// Cache line size assumed for shard padding
/// [PERF] x86-64, ARM64 and RISC-V all use 64-byte lines
pub const CACHE_LINE_SIZE: usize = 64;

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Requested shard count override
pub const ENV_SHARDS: &str = "SHARDCALLS_SHARDS";

/// Default waiter timeout override, in milliseconds
pub const ENV_WAIT_TIMEOUT_MS: &str = "SHARDCALLS_WAIT_TIMEOUT_MS";

/// JSON log output switch (`1` or `true`)
pub const ENV_TRACE_JSON: &str = "SHARDCALLS_TRACE_JSON";
