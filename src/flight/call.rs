/*!
 * In-Flight Call Record
 *
 * One record per key per generation. The initiating caller completes it
 * exactly once; every attached caller reads a clone of the same outcome.
 *
 * Completion is broadcast with a `parking_lot::Condvar` guarded by the
 * record's own state mutex, so a waiter that attaches just before the
 * outcome is stored can never miss the wakeup: it checks the slot under the
 * same lock the initiator writes it under.
 */

use crate::core::errors::FlightResult;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Outcome of a deduplicated call as seen by one caller
///
/// `shared` is telemetry: `false` for the caller whose work function ran,
/// `true` for callers that attached to an execution already in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<V, E> {
    pub result: FlightResult<V, E>,
    pub shared: bool,
}

impl<V, E> Completion<V, E> {
    #[inline]
    pub(crate) fn executed(result: FlightResult<V, E>) -> Self {
        Self {
            result,
            shared: false,
        }
    }

    #[inline]
    pub(crate) fn joined(result: FlightResult<V, E>) -> Self {
        Self {
            result,
            shared: true,
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> FlightResult<V, E> {
        self.result
    }

    /// Split into `(result, shared)`
    pub fn into_parts(self) -> (FlightResult<V, E>, bool) {
        (self.result, self.shared)
    }
}

struct CallState<V, E> {
    outcome: Option<FlightResult<V, E>>,
    subscribers: Vec<flume::Sender<Completion<V, E>>>,
}

/// Blocking call record
pub(crate) struct Call<V, E> {
    state: Mutex<CallState<V, E>>,
    done: Condvar,
    /// Attached callers, initiator included. Diagnostics only.
    waiters: AtomicUsize,
}

impl<V, E> Call<V, E>
where
    V: Clone,
    E: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(CallState {
                outcome: None,
                subscribers: Vec::new(),
            }),
            done: Condvar::new(),
            waiters: AtomicUsize::new(1),
        }
    }

    /// Register another caller; returns the new waiter count
    #[inline]
    pub(crate) fn attach(&self) -> usize {
        self.waiters.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Withdraw a caller that stopped waiting
    #[inline]
    pub(crate) fn detach(&self) {
        self.waiters.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }

    /// Store the outcome and release every waiter
    ///
    /// Called exactly once, by the initiator, after the record has left the
    /// group's map.
    pub(crate) fn complete(&self, outcome: FlightResult<V, E>) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.outcome.is_none(), "call completed twice");
            for tx in state.subscribers.drain(..) {
                // Receiver may be gone; that caller stopped caring
                let _ = tx.send(Completion::joined(outcome.clone()));
            }
            state.outcome = Some(outcome);
        }
        self.done.notify_all();
    }

    /// Block until the outcome is available
    pub(crate) fn wait(&self) -> FlightResult<V, E> {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            self.done.wait(&mut state);
        }
    }

    /// Block until the outcome is available or `timeout` elapses
    ///
    /// Returns `None` on timeout.
    pub(crate) fn wait_for(&self, timeout: Duration) -> Option<FlightResult<V, E>> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait());
        };

        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return Some(outcome.clone());
            }
            if self.done.wait_until(&mut state, deadline).timed_out() {
                return state.outcome.clone();
            }
        }
    }

    /// Deliver the outcome on `tx` once it exists
    pub(crate) fn subscribe(&self, tx: flume::Sender<Completion<V, E>>) {
        let mut state = self.state.lock();
        match &state.outcome {
            Some(outcome) => {
                let _ = tx.send(Completion::joined(outcome.clone()));
            }
            None => state.subscribers.push(tx),
        }
    }
}
