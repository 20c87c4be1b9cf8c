/*!
 * Core Module
 * Hashing, limits, shard sizing and error types shared by the flight layer
 */

pub mod errors;
pub mod hash;
pub mod limits;
pub mod shard_manager;

// Re-export for convenience
pub use errors::*;
pub use hash::{FixedAHasher, Fnv1a, KeyHasher};
pub use shard_manager::{ShardManager, WorkloadProfile};
