/*!
 * Sharded Coordinators
 *
 * Route each key to exactly one group by `hash(key bytes) & mask` and
 * delegate. The coordinator holds no state besides the immutable shard array,
 * so contention is bounded to callers whose keys share a shard.
 *
 * Keys are hashed through `AsRef<[u8]>`. Lookup helpers accept any borrowed
 * form `Q` of the key; `Q::as_ref` must yield the same bytes as `K::as_ref`
 * (true for `String`/`str` and `Vec<u8>`/`[u8]`).
 */

use super::async_group::AsyncGroup;
use super::call::Completion;
use super::config::CoordinatorConfig;
use super::group::Group;
use super::router::ShardRouter;
use super::stats::CoordinatorStats;
use crate::core::errors::ConfigResult;
use crate::core::hash::{Fnv1a, KeyHasher};
use std::borrow::Borrow;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Blocking sharded call-deduplication coordinator
///
/// # Example
///
/// ```
/// use shardcalls::ShardedCoordinator;
///
/// let calls: ShardedCoordinator<String, String, String> = ShardedCoordinator::new(5).unwrap();
/// assert_eq!(calls.shard_count(), 8);
///
/// let completion = calls.run("user:42".to_string(), || Ok("loaded".to_string()));
/// assert_eq!(completion.result, Ok("loaded".to_string()));
/// assert!(!completion.shared);
/// ```
pub struct ShardedCoordinator<K, V, E, H = Fnv1a> {
    router: ShardRouter<Arc<Group<K, V, E>>, H>,
    wait_timeout: Option<Duration>,
}

impl<K, V, E> ShardedCoordinator<K, V, E, Fnv1a>
where
    K: AsRef<[u8]> + Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    /// Coordinator with `shard_count` rounded up to a power of two
    pub fn new(shard_count: usize) -> ConfigResult<Self> {
        Self::with_hasher(shard_count, Fnv1a)
    }

    pub fn from_config(config: &CoordinatorConfig) -> ConfigResult<Self> {
        Self::from_config_with_hasher(config, Fnv1a)
    }
}

impl<K, V, E, H> ShardedCoordinator<K, V, E, H>
where
    K: AsRef<[u8]> + Hash + Eq + Clone,
    V: Clone,
    E: Clone,
    H: KeyHasher,
{
    pub fn with_hasher(shard_count: usize, hasher: H) -> ConfigResult<Self> {
        Self::from_config_with_hasher(&CoordinatorConfig::new(shard_count), hasher)
    }

    pub fn from_config_with_hasher(config: &CoordinatorConfig, hasher: H) -> ConfigResult<Self> {
        let router = ShardRouter::new(config.shards, hasher, |id| Arc::new(Group::with_id(id)))?;
        Ok(Self {
            router,
            wait_timeout: config.wait_timeout,
        })
    }

    /// Execute `work` once per in-flight generation of `key`
    ///
    /// Uses the configured default waiter timeout, if any.
    pub fn run<F>(&self, key: K, work: F) -> Completion<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let group = self.router.shard_for(key.as_ref());
        match self.wait_timeout {
            Some(timeout) => group.run_timeout(key, timeout, work),
            None => group.run(key, work),
        }
    }

    /// Execute with an explicit waiter timeout
    pub fn run_timeout<F>(&self, key: K, timeout: Duration, work: F) -> Completion<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.router
            .shard_for(key.as_ref())
            .run_timeout(key, timeout, work)
    }

    /// Deliver the outcome on a channel instead of blocking
    pub fn run_chan<F>(&self, key: K, work: F) -> flume::Receiver<Completion<V, E>>
    where
        K: Send + Sync + 'static,
        V: Send + Sync + 'static,
        E: Send + Sync + 'static,
        F: FnOnce() -> Result<V, E> + Send + 'static,
    {
        self.router.shard_for(key.as_ref()).run_chan(key, work)
    }

    /// Drop the in-flight record for `key` so the next caller starts fresh
    pub fn forget<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: AsRef<[u8]> + Hash + Eq + ?Sized,
    {
        self.router.shard_for(key.as_ref()).forget(key)
    }

    pub fn is_in_flight<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: AsRef<[u8]> + Hash + Eq + ?Sized,
    {
        self.router.shard_for(key.as_ref()).is_in_flight(key)
    }

    /// Callers attached to `key`'s in-flight call, initiator included
    pub fn waiters<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: AsRef<[u8]> + Hash + Eq + ?Sized,
    {
        self.router.shard_for(key.as_ref()).waiters(key)
    }

    /// Keys in flight across all shards
    pub fn in_flight(&self) -> usize {
        self.router.shards().iter().map(|g| g.in_flight()).sum()
    }

    /// Shard that `key` routes to
    #[inline]
    pub fn shard_index<Q>(&self, key: &Q) -> usize
    where
        Q: AsRef<[u8]> + ?Sized,
    {
        self.router.index_of(key.as_ref())
    }

    pub fn shard(&self, index: usize) -> Option<&Group<K, V, E>> {
        self.router.shards().get(index).map(Arc::as_ref)
    }

    /// Effective shard count, a power of two
    #[inline]
    pub fn shard_count(&self) -> usize {
        self.router.len()
    }

    #[inline]
    pub fn requested_shards(&self) -> usize {
        self.router.requested()
    }

    #[inline]
    pub fn mask(&self) -> u64 {
        self.router.mask()
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats::collect(
            self.router.requested(),
            self.router.hasher().name(),
            self.router.shards().iter().map(|g| g.stats()),
        )
    }
}

/// Async sharded call-deduplication coordinator
///
/// Waiters suspend their task instead of blocking a thread.
pub struct AsyncShardedCoordinator<K, V, E, H = Fnv1a> {
    router: ShardRouter<AsyncGroup<K, V, E>, H>,
    wait_timeout: Option<Duration>,
}

impl<K, V, E> AsyncShardedCoordinator<K, V, E, Fnv1a>
where
    K: AsRef<[u8]> + Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    pub fn new(shard_count: usize) -> ConfigResult<Self> {
        Self::with_hasher(shard_count, Fnv1a)
    }

    pub fn from_config(config: &CoordinatorConfig) -> ConfigResult<Self> {
        Self::from_config_with_hasher(config, Fnv1a)
    }
}

impl<K, V, E, H> AsyncShardedCoordinator<K, V, E, H>
where
    K: AsRef<[u8]> + Hash + Eq + Clone,
    V: Clone,
    E: Clone,
    H: KeyHasher,
{
    pub fn with_hasher(shard_count: usize, hasher: H) -> ConfigResult<Self> {
        Self::from_config_with_hasher(&CoordinatorConfig::new(shard_count), hasher)
    }

    pub fn from_config_with_hasher(config: &CoordinatorConfig, hasher: H) -> ConfigResult<Self> {
        let router = ShardRouter::new(config.shards, hasher, AsyncGroup::with_id)?;
        Ok(Self {
            router,
            wait_timeout: config.wait_timeout,
        })
    }

    pub async fn run<F, Fut>(&self, key: K, work: F) -> Completion<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let group = self.router.shard_for(key.as_ref());
        match self.wait_timeout {
            Some(timeout) => group.run_timeout(key, timeout, work).await,
            None => group.run(key, work).await,
        }
    }

    pub async fn run_timeout<F, Fut>(&self, key: K, timeout: Duration, work: F) -> Completion<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.router
            .shard_for(key.as_ref())
            .run_timeout(key, timeout, work)
            .await
    }

    pub fn forget<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: AsRef<[u8]> + Hash + Eq + ?Sized,
    {
        self.router.shard_for(key.as_ref()).forget(key)
    }

    pub fn is_in_flight<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: AsRef<[u8]> + Hash + Eq + ?Sized,
    {
        self.router.shard_for(key.as_ref()).is_in_flight(key)
    }

    pub fn waiters<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: AsRef<[u8]> + Hash + Eq + ?Sized,
    {
        self.router.shard_for(key.as_ref()).waiters(key)
    }

    pub fn in_flight(&self) -> usize {
        self.router.shards().iter().map(|g| g.in_flight()).sum()
    }

    #[inline]
    pub fn shard_index<Q>(&self, key: &Q) -> usize
    where
        Q: AsRef<[u8]> + ?Sized,
    {
        self.router.index_of(key.as_ref())
    }

    #[inline]
    pub fn shard_count(&self) -> usize {
        self.router.len()
    }

    #[inline]
    pub fn requested_shards(&self) -> usize {
        self.router.requested()
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats::collect(
            self.router.requested(),
            self.router.hasher().name(),
            self.router.shards().iter().map(|g| g.stats()),
        )
    }
}
