/*!
 * Async Call Group
 *
 * Same single-execution-per-key contract as [`Group`](super::Group), for
 * tokio tasks. Waiters suspend on a `watch` channel instead of blocking a
 * thread.
 *
 * An async initiator can be dropped mid-flight (its task cancelled or its
 * future discarded). A drop guard finalizes the record with
 * `FlightError::Abandoned` in that case, so attached waiters are released
 * and the key is free for a fresh generation.
 */

use super::call::Completion;
use super::stats::{FlightCounters, GroupStats};
use crate::core::errors::{panic_message, FlightError, FlightResult};
use ahash::RandomState;
use futures::FutureExt;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

struct AsyncCall<V, E> {
    slot: watch::Sender<Option<FlightResult<V, E>>>,
    waiters: AtomicUsize,
}

impl<V, E> AsyncCall<V, E> {
    fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot,
            waiters: AtomicUsize::new(1),
        }
    }

    fn complete(&self, outcome: FlightResult<V, E>) {
        // send_replace stores the value even with no receivers
        self.slot.send_replace(Some(outcome));
    }
}

enum AsyncRole<V, E> {
    Initiator(Arc<AsyncCall<V, E>>),
    Waiter(Arc<AsyncCall<V, E>>, watch::Receiver<Option<FlightResult<V, E>>>),
}

/// Single-execution-per-key group for async work
#[repr(C, align(64))]
pub struct AsyncGroup<K, V, E> {
    calls: Mutex<HashMap<K, Arc<AsyncCall<V, E>>, RandomState>>,
    counters: FlightCounters,
    id: usize,
}

impl<K, V, E> AsyncGroup<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    pub fn new() -> Self {
        Self::with_id(0)
    }

    pub(crate) fn with_id(id: usize) -> Self {
        Self {
            calls: Mutex::new(HashMap::with_hasher(RandomState::new())),
            counters: FlightCounters::default(),
            id,
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Run the future produced by `work` unless a call for `key` is already
    /// in flight, in which case await that call's outcome
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Completion<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        match self.join(&key) {
            AsyncRole::Waiter(_, rx) => Completion::joined(Self::wait(rx).await),
            AsyncRole::Initiator(call) => {
                Completion::executed(self.execute(&key, &call, work).await)
            }
        }
    }

    /// Like [`run`](Self::run), but a waiter stops waiting after `timeout`
    pub async fn run_timeout<F, Fut>(&self, key: K, timeout: Duration, work: F) -> Completion<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        match self.join(&key) {
            AsyncRole::Waiter(call, rx) => {
                match tokio::time::timeout(timeout, Self::wait(rx)).await {
                    Ok(outcome) => Completion::joined(outcome),
                    Err(_) => {
                        call.waiters.fetch_sub(1, Ordering::Relaxed);
                        self.counters.record_timeout();
                        debug!(shard = self.id, ?timeout, "async waiter timed out");
                        Completion::joined(Err(FlightError::Timeout(timeout)))
                    }
                }
            }
            AsyncRole::Initiator(call) => {
                Completion::executed(self.execute(&key, &call, work).await)
            }
        }
    }

    /// Drop the in-flight record for `key`; see [`Group::forget`](super::Group::forget)
    pub fn forget<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.calls.lock().remove(key).is_some();
        if removed {
            self.counters.record_forgotten();
            debug!(shard = self.id, "forgot in-flight call");
        }
        removed
    }

    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_in_flight<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.calls.lock().contains_key(key)
    }

    pub fn waiters<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.calls
            .lock()
            .get(key)
            .map(|call| call.waiters.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> GroupStats {
        self.counters.snapshot(self.in_flight())
    }

    fn join(&self, key: &K) -> AsyncRole<V, E> {
        let mut calls = self.calls.lock();

        if let Some(call) = calls.get(key) {
            let waiters = call.waiters.fetch_add(1, Ordering::Relaxed) + 1;
            self.counters.record_shared();
            trace!(shard = self.id, waiters, "attached to in-flight call");
            return AsyncRole::Waiter(Arc::clone(call), call.slot.subscribe());
        }

        let call = Arc::new(AsyncCall::new());
        calls.insert(key.clone(), Arc::clone(&call));
        AsyncRole::Initiator(call)
    }

    async fn wait(mut rx: watch::Receiver<Option<FlightResult<V, E>>>) -> FlightResult<V, E> {
        match rx.wait_for(Option::is_some).await {
            Ok(slot) => Option::clone(&slot).unwrap_or(Err(FlightError::Abandoned)),
            // Sender gone without a value
            Err(_) => Err(FlightError::Abandoned),
        }
    }

    async fn execute<F, Fut>(
        &self,
        key: &K,
        call: &Arc<AsyncCall<V, E>>,
        work: F,
    ) -> FlightResult<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        self.counters.record_execution();
        trace!(shard = self.id, "executing async work");

        let guard = FlightGuard {
            group: self,
            key,
            call,
            armed: true,
        };

        let outcome = match AssertUnwindSafe(async move { work().await })
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(FlightError::Work(err)),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.counters.record_panic();
                warn!(
                    shard = self.id,
                    waiters = call.waiters.load(Ordering::Relaxed),
                    panic = %message,
                    "async work panicked, failing every attached caller"
                );
                Err(FlightError::Panicked(message))
            }
        };

        guard.complete(outcome.clone());
        outcome
    }

    fn finish(&self, key: &K, call: &Arc<AsyncCall<V, E>>, outcome: FlightResult<V, E>) {
        {
            let mut calls = self.calls.lock();
            if calls
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, call))
            {
                calls.remove(key);
            }
        }
        call.complete(outcome);
    }
}

impl<K, V, E> Default for AsyncGroup<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Finalizes a call whose initiator future was dropped before completing
struct FlightGuard<'a, K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    group: &'a AsyncGroup<K, V, E>,
    key: &'a K,
    call: &'a Arc<AsyncCall<V, E>>,
    armed: bool,
}

impl<K, V, E> FlightGuard<'_, K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    fn complete(mut self, outcome: FlightResult<V, E>) {
        self.armed = false;
        self.group.finish(self.key, self.call, outcome);
    }
}

impl<K, V, E> Drop for FlightGuard<'_, K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    fn drop(&mut self) {
        if self.armed {
            self.group.counters.record_abandoned();
            warn!(
                shard = self.group.id,
                waiters = self.call.waiters.load(Ordering::Relaxed),
                "async initiator dropped before completing, releasing waiters"
            );
            self.group
                .finish(self.key, self.call, Err(FlightError::Abandoned));
        }
    }
}
