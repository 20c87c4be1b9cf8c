/*!
 * shardcalls
 * Sharded call deduplication: one in-flight execution per key, shared by
 * every concurrent caller
 */

pub mod core;
pub mod flight;
pub mod monitoring;

// Re-exports
pub use crate::core::errors::{ConfigError, ConfigResult, FlightError, FlightResult};
pub use crate::core::hash::{FixedAHasher, Fnv1a, KeyHasher};
pub use crate::core::limits::{DEFAULT_SHARDS, MAX_SHARDS};
pub use crate::core::shard_manager::{ShardManager, WorkloadProfile};
pub use flight::{
    effective_shard_count, AsyncGroup, AsyncShardedCoordinator, Completion, CoordinatorConfig,
    CoordinatorStats, Group, GroupStats, ShardRouter, ShardedCoordinator,
};
pub use monitoring::init_tracing;
