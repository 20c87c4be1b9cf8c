/*!
 * Call Group (Shard)
 *
 * Owns a map from key to in-flight call record behind one exclusive lock.
 * The lock is held only for O(1) map operations, never while work runs and
 * never while a caller waits for an outcome.
 *
 * # Lifecycle
 *
 * 1. First caller for an idle key inserts a record and becomes the initiator
 * 2. Later callers find the record, attach, and block on its completion
 * 3. The initiator runs the work outside the lock, catching panics
 * 4. The initiator removes the record, then publishes the outcome
 *
 * Removal happens on success, failure and panic alike, so the next caller
 * for the key always starts a fresh generation.
 */

use super::call::{Call, Completion};
use super::stats::{FlightCounters, GroupStats};
use crate::core::errors::{panic_message, FlightError, FlightResult};
use ahash::RandomState;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// What a caller became when it reached the group
enum Role<V, E> {
    Initiator(Arc<Call<V, E>>),
    Waiter(Arc<Call<V, E>>),
}

/// Single-execution-per-key group
///
/// # Performance
///
/// - Cache-line aligned so neighbouring shards in a coordinator don't share
///   a line
/// - ahash map hasher; keys are compared exactly, so hash quality only
///   matters for map performance
#[repr(C, align(64))]
pub struct Group<K, V, E> {
    calls: Mutex<HashMap<K, Arc<Call<V, E>>, RandomState>>,
    counters: FlightCounters,
    id: usize,
}

impl<K, V, E> Group<K, V, E>
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

    /// Position of this group inside its coordinator (0 when standalone)
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Run `work` unless a call for `key` is already in flight, in which
    /// case wait for that call and return its outcome
    ///
    /// Panics inside `work` never escape: every caller of the generation,
    /// the initiator included, receives `FlightError::Panicked`.
    pub fn run<F>(&self, key: K, work: F) -> Completion<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        match self.join(&key) {
            Role::Waiter(call) => Completion::joined(call.wait()),
            Role::Initiator(call) => Completion::executed(self.execute(&key, &call, work)),
        }
    }

    /// Like [`run`](Self::run), but a waiter gives up after `timeout`
    ///
    /// Giving up only affects this caller: the in-flight work keeps running
    /// and other waiters still receive its outcome. The initiator runs the
    /// work to completion regardless of `timeout`.
    pub fn run_timeout<F>(&self, key: K, timeout: Duration, work: F) -> Completion<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        match self.join(&key) {
            Role::Waiter(call) => match call.wait_for(timeout) {
                Some(outcome) => Completion::joined(outcome),
                None => {
                    call.detach();
                    self.counters.record_timeout();
                    debug!(shard = self.id, ?timeout, "waiter timed out");
                    Completion::joined(Err(FlightError::Timeout(timeout)))
                }
            },
            Role::Initiator(call) => Completion::executed(self.execute(&key, &call, work)),
        }
    }

    /// Non-blocking variant: the outcome arrives on the returned channel
    ///
    /// If this caller initiates, `work` runs on a dedicated thread.
    pub fn run_chan<F>(self: &Arc<Self>, key: K, work: F) -> flume::Receiver<Completion<V, E>>
    where
        K: Send + Sync + 'static,
        V: Send + Sync + 'static,
        E: Send + Sync + 'static,
        F: FnOnce() -> Result<V, E> + Send + 'static,
    {
        let (tx, rx) = flume::bounded(1);

        match self.join(&key) {
            Role::Waiter(call) => call.subscribe(tx),
            Role::Initiator(call) => {
                let group = Arc::clone(self);
                let thread_key = key.clone();
                let thread_call = Arc::clone(&call);
                let thread_tx = tx.clone();

                let spawned = thread::Builder::new()
                    .name(format!("shardcalls-flight-{}", self.id))
                    .spawn(move || {
                        let outcome = group.execute(&thread_key, &thread_call, work);
                        let _ = thread_tx.send(Completion::executed(outcome));
                    });

                if let Err(e) = spawned {
                    warn!(shard = self.id, error = %e, "failed to spawn flight thread");
                    let outcome = Err(FlightError::Spawn(e.to_string()));
                    self.finish(&key, &call, outcome.clone());
                    let _ = tx.send(Completion::executed(outcome));
                }
            }
        }

        rx
    }

    /// Drop the in-flight record for `key`
    ///
    /// The next caller starts a new generation. Callers already attached
    /// still receive the old generation's outcome.
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

    /// Number of keys with a call in flight
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

    /// Callers attached to the in-flight call for `key`, initiator included
    pub fn waiters<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.calls.lock().get(key).map(|call| call.waiters())
    }

    pub fn stats(&self) -> GroupStats {
        self.counters.snapshot(self.in_flight())
    }

    fn join(&self, key: &K) -> Role<V, E> {
        let mut calls = self.calls.lock();

        if let Some(call) = calls.get(key) {
            let waiters = call.attach();
            self.counters.record_shared();
            trace!(shard = self.id, waiters, "attached to in-flight call");
            return Role::Waiter(Arc::clone(call));
        }

        let call = Arc::new(Call::new());
        calls.insert(key.clone(), Arc::clone(&call));
        Role::Initiator(call)
    }

    fn execute<F>(&self, key: &K, call: &Arc<Call<V, E>>, work: F) -> FlightResult<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.counters.record_execution();
        trace!(shard = self.id, "executing work");

        let outcome = match panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(FlightError::Work(err)),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.counters.record_panic();
                warn!(
                    shard = self.id,
                    waiters = call.waiters(),
                    panic = %message,
                    "work panicked, failing every attached caller"
                );
                Err(FlightError::Panicked(message))
            }
        };

        self.finish(key, call, outcome.clone());
        outcome
    }

    /// Remove the record (if `forget` hasn't already) and publish
    fn finish(&self, key: &K, call: &Arc<Call<V, E>>, outcome: FlightResult<V, E>) {
        {
            let mut calls = self.calls.lock();
            if calls
                .get(key)
                .is_some_and(|current| Arc::ptr_eq(current, call))
            {
                calls.remove(key);
            }
        }
        trace!(shard = self.id, waiters = call.waiters(), "call complete");
        call.complete(outcome);
    }
}

impl<K, V, E> Default for Group<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
