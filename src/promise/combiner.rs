//! Fan-in barriers over completion futures.
//!
//! Both combinators share the same counting discipline: an expected count
//! bumped at registration, a done count bumped by completion listeners, and a
//! sealed flag published by the finishing call. All updates are atomic
//! fetch-and-adds so no completion is ever lost, and whichever side observes
//! `done == expected` after sealing resolves the aggregate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use super::completion::{Cause, CompletionFuture, FutureState, Promise};
use crate::error::PromiseError;

/// Cause recorded when an aggregated future is canceled rather than failed.
#[derive(Error, Debug)]
#[error("aggregated future was canceled")]
struct InputCanceled;

/// Shared fan-in state.
struct Barrier {
    expected: AtomicUsize,
    done: AtomicUsize,
    sealed: AtomicBool,
    target: Mutex<Option<Promise>>,
    /// First failure's cause(s); later failures are tolerated silently.
    causes: Mutex<Vec<Cause>>,
}

impl Barrier {
    fn new(target: Option<Promise>) -> Arc<Self> {
        Arc::new(Self {
            expected: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
            sealed: AtomicBool::new(false),
            target: Mutex::new(target),
            causes: Mutex::new(Vec::new()),
        })
    }

    /// Register one more future to watch. Must not be called after sealing.
    fn watch(self: &Arc<Self>, future: &CompletionFuture) {
        self.expected.fetch_add(1, Ordering::SeqCst);

        let barrier = Arc::clone(self);
        future.on_complete(move |state| {
            match state {
                FutureState::Faulted(causes) => {
                    let mut recorded = barrier.causes.lock();
                    if recorded.is_empty() {
                        recorded.extend(causes.iter().cloned());
                    }
                }
                FutureState::Canceled => {
                    let mut recorded = barrier.causes.lock();
                    if recorded.is_empty() {
                        recorded.push(Arc::new(InputCanceled));
                    }
                }
                _ => {}
            }

            let done = barrier.done.fetch_add(1, Ordering::SeqCst) + 1;
            if barrier.sealed.load(Ordering::SeqCst)
                && done == barrier.expected.load(Ordering::SeqCst)
            {
                barrier.resolve();
            }
        });
    }

    /// Seal registration and resolve immediately if everything already
    /// completed. Returns false if already sealed.
    fn seal(&self) -> bool {
        if self.sealed.swap(true, Ordering::SeqCst) {
            return false;
        }
        if self.done.load(Ordering::SeqCst) == self.expected.load(Ordering::SeqCst) {
            self.resolve();
        }
        true
    }

    /// Resolve the aggregate exactly once; racing callers take `None`.
    fn resolve(&self) {
        let target = self.target.lock().take();
        if let Some(promise) = target {
            let causes = std::mem::take(&mut *self.causes.lock());
            if causes.is_empty() {
                promise.try_complete();
            } else {
                promise.try_fail_all(causes);
            }
        }
    }
}

/// Fan-in barrier over dynamically registered futures.
///
/// The aggregate supplied to [`PromiseCombiner::finish`] succeeds iff every
/// added future succeeded; otherwise it fails with the first recorded failure
/// cause(s). A canceled input counts as a failure.
pub struct PromiseCombiner {
    barrier: Arc<Barrier>,
    finish_called: AtomicBool,
}

impl PromiseCombiner {
    /// Create an empty combiner.
    pub fn new() -> Self {
        Self {
            barrier: Barrier::new(None),
            finish_called: AtomicBool::new(false),
        }
    }

    /// Register a future to watch.
    ///
    /// Returns [`PromiseError::CombinerSealed`] once
    /// [`PromiseCombiner::finish`] has been called.
    pub fn add(&self, future: &CompletionFuture) -> Result<(), PromiseError> {
        if self.barrier.sealed.load(Ordering::SeqCst) {
            return Err(PromiseError::CombinerSealed);
        }
        self.barrier.watch(future);
        Ok(())
    }

    /// Register several futures to watch.
    pub fn add_all(&self, futures: &[CompletionFuture]) -> Result<(), PromiseError> {
        for future in futures {
            self.add(future)?;
        }
        Ok(())
    }

    /// Freeze registration and bind the aggregate promise.
    ///
    /// If every registered future is already done the aggregate resolves
    /// before this call returns; otherwise resolution happens in the listener
    /// that observes the final completion. Calling `finish` twice returns
    /// [`PromiseError::AlreadyComplete`].
    pub fn finish(&self, aggregate: Promise) -> Result<(), PromiseError> {
        if self.finish_called.swap(true, Ordering::SeqCst) {
            return Err(PromiseError::AlreadyComplete);
        }
        *self.barrier.target.lock() = Some(aggregate);
        self.barrier.seal();
        Ok(())
    }
}

impl Default for PromiseCombiner {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan-in barrier pre-bound to an externally supplied promise, with a
/// two-phase allocate-then-seal protocol.
///
/// Unlike a plain promise, the aggregator tolerates more than one failure
/// notification from its trackees: the first failure's cause(s) decide the
/// outcome, later ones are absorbed.
pub struct PromiseAggregator {
    barrier: Arc<Barrier>,
}

impl PromiseAggregator {
    /// Create an aggregator bound to `target`.
    pub fn new(target: Promise) -> Self {
        Self {
            barrier: Barrier::new(Some(target)),
        }
    }

    /// Allocate one more sub-promise to track.
    ///
    /// Forbidden after [`PromiseAggregator::done_allocating`].
    pub fn new_promise(&self) -> Result<Promise, PromiseError> {
        if self.barrier.sealed.load(Ordering::SeqCst) {
            return Err(PromiseError::CombinerSealed);
        }
        let promise = Promise::new();
        self.barrier.watch(&promise.future());
        Ok(promise)
    }

    /// Seal allocation; resolves the target immediately if every sub-promise
    /// is already done.
    pub fn done_allocating(&self) {
        self.barrier.seal();
    }
}
