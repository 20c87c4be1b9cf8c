/*!
 * Flight Layer
 *
 * Call deduplication: at most one execution in flight per key, with every
 * concurrent caller for that key receiving the same outcome.
 *
 * # Architecture
 *
 * - `Group` / `AsyncGroup`: one lock + one key map each (a shard)
 * - `ShardRouter`: fixed power-of-two shard array, `hash & mask` selection
 * - `ShardedCoordinator` / `AsyncShardedCoordinator`: public entry points
 *
 * # Use Cases
 *
 * - **Cache fronts**: one backend load per missing key
 * - **RPC clients**: coalesce identical concurrent requests
 * - **Fan-in services**: bound duplicate expensive computations
 */

mod async_group;
mod call;
mod config;
mod coordinator;
mod group;
mod router;
mod stats;

pub use async_group::AsyncGroup;
pub use call::Completion;
pub use config::CoordinatorConfig;
pub use coordinator::{AsyncShardedCoordinator, ShardedCoordinator};
pub use group::Group;
pub use router::{effective_shard_count, ShardRouter};
pub use stats::{CoordinatorStats, GroupStats};
