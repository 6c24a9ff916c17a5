//! Single-assignment completion cells.
//!
//! A [`Promise`] is the write side of an asynchronous completion: exactly one
//! terminal transition (success, failure, or cancellation) ever wins, and all
//! later attempts either report failure (`try_*`) or raise
//! [`PromiseError::AlreadyComplete`]. A [`CompletionFuture`] is the cloneable
//! read side, supporting blocking waits and completion listeners.

use log::warn;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::PromiseError;

/// A failure cause attached to a faulted promise.
pub type Cause = Arc<dyn std::error::Error + Send + Sync>;

/// Observable state of a promise.
#[derive(Clone, Debug)]
pub enum FutureState {
    /// No terminal transition has happened yet
    Pending,

    /// The promise completed successfully
    Succeeded,

    /// The promise failed with one or more causes
    Faulted(Vec<Cause>),

    /// The promise was canceled
    Canceled,
}

impl FutureState {
    /// Returns true once a terminal transition has happened.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, FutureState::Pending)
    }
}

type Listener = Box<dyn FnOnce(&FutureState) + Send>;

/// State guarded by the cell mutex.
struct Cell {
    state: FutureState,
    uncancellable: bool,
    listeners: Vec<Listener>,
    value: Option<Box<dyn Any + Send>>,
}

struct Inner {
    cell: Mutex<Cell>,
    done: Condvar,
}

impl Inner {
    /// Attempt the one terminal transition. Listeners run outside the lock,
    /// on the completing thread.
    fn transition(&self, next: FutureState) -> bool {
        let listeners;
        let state;
        {
            let mut cell = self.cell.lock();
            if cell.state.is_terminal() {
                return false;
            }
            cell.state = next;
            state = cell.state.clone();
            listeners = std::mem::take(&mut cell.listeners);
        }
        self.done.notify_all();
        for listener in listeners {
            listener(&state);
        }
        true
    }
}

/// The write side of a completion cell.
///
/// Cloning a promise yields another handle to the same cell; the
/// single-assignment guarantee is per cell, not per handle.
#[derive(Clone)]
pub struct Promise {
    inner: Arc<Inner>,
}

impl Promise {
    /// Create a new pending promise.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cell: Mutex::new(Cell {
                    state: FutureState::Pending,
                    uncancellable: false,
                    listeners: Vec::new(),
                    value: None,
                }),
                done: Condvar::new(),
            }),
        }
    }

    /// Mark the promise succeeded. Returns false if it was already terminal.
    pub fn try_complete(&self) -> bool {
        self.inner.transition(FutureState::Succeeded)
    }

    /// Mark the promise succeeded, raising if it was already terminal.
    pub fn complete(&self) -> Result<(), PromiseError> {
        if self.try_complete() {
            Ok(())
        } else {
            Err(PromiseError::AlreadyComplete)
        }
    }

    /// Mark the promise failed with a single cause.
    pub fn try_fail(&self, cause: Cause) -> bool {
        self.inner.transition(FutureState::Faulted(vec![cause]))
    }

    /// Mark the promise failed with one or more causes.
    pub fn try_fail_all(&self, causes: Vec<Cause>) -> bool {
        self.inner.transition(FutureState::Faulted(causes))
    }

    /// Mark the promise failed, raising if it was already terminal.
    pub fn fail(&self, cause: Cause) -> Result<(), PromiseError> {
        if self.try_fail(cause) {
            Ok(())
        } else {
            Err(PromiseError::AlreadyComplete)
        }
    }

    /// Mark the promise canceled. Returns false if it was already terminal
    /// or has been made uncancellable.
    pub fn try_cancel(&self) -> bool {
        let listeners;
        let state;
        {
            let mut cell = self.inner.cell.lock();
            if cell.state.is_terminal() || cell.uncancellable {
                return false;
            }
            cell.state = FutureState::Canceled;
            state = cell.state.clone();
            listeners = std::mem::take(&mut cell.listeners);
        }
        self.inner.done.notify_all();
        for listener in listeners {
            listener(&state);
        }
        true
    }

    /// Mark the promise canceled, raising if cancellation is not possible.
    pub fn cancel(&self) -> Result<(), PromiseError> {
        if self.try_cancel() {
            Ok(())
        } else {
            Err(PromiseError::AlreadyComplete)
        }
    }

    /// Latch the promise against cancellation.
    ///
    /// Idempotent. Returns false if the promise is already terminal, true
    /// otherwise; after a true return, [`Promise::try_cancel`] always fails.
    /// Cancel-capable callers must consult this before racing a running task.
    pub fn set_uncancellable(&self) -> bool {
        let mut cell = self.inner.cell.lock();
        if cell.state.is_terminal() {
            return false;
        }
        cell.uncancellable = true;
        true
    }

    /// Attach an opaque state value for the convenience of the owning task.
    pub fn set_state_value(&self, value: Box<dyn Any + Send>) {
        self.inner.cell.lock().value = Some(value);
    }

    /// Take back the opaque state value, if any.
    pub fn take_state_value(&self) -> Option<Box<dyn Any + Send>> {
        self.inner.cell.lock().value.take()
    }

    /// The read side of this promise.
    pub fn future(&self) -> CompletionFuture {
        CompletionFuture {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> FutureState {
        self.inner.cell.lock().state.clone()
    }

    /// True once a terminal transition has happened.
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// Complete the promise from an internal race where losing is expected
    /// but worth a diagnostic, e.g. a task finishing after its promise was
    /// failed elsewhere.
    pub(crate) fn complete_or_warn(&self, context: &str) {
        if !self.try_complete() {
            warn!("promise already completed while {context}: {:?}", self.state());
        }
    }
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Promise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise").field("state", &self.state()).finish()
    }
}

/// The cloneable read side of a [`Promise`].
#[derive(Clone)]
pub struct CompletionFuture {
    inner: Arc<Inner>,
}

impl CompletionFuture {
    /// Current state snapshot.
    pub fn state(&self) -> FutureState {
        self.inner.cell.lock().state.clone()
    }

    /// True once a terminal transition has happened.
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    /// True if the promise completed successfully.
    pub fn is_succeeded(&self) -> bool {
        matches!(self.state(), FutureState::Succeeded)
    }

    /// True if the promise failed.
    pub fn is_faulted(&self) -> bool {
        matches!(self.state(), FutureState::Faulted(_))
    }

    /// True if the promise was canceled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.state(), FutureState::Canceled)
    }

    /// Failure causes, empty unless faulted.
    pub fn causes(&self) -> Vec<Cause> {
        match self.state() {
            FutureState::Faulted(causes) => causes,
            _ => Vec::new(),
        }
    }

    /// Block the calling thread until the promise is terminal.
    pub fn wait(&self) {
        let mut cell = self.inner.cell.lock();
        while !cell.state.is_terminal() {
            self.inner.done.wait(&mut cell);
        }
    }

    /// Block until the promise is terminal or the timeout elapses.
    ///
    /// Returns true if the promise is terminal when this call returns.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cell = self.inner.cell.lock();
        while !cell.state.is_terminal() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let _ = self.inner.done.wait_for(&mut cell, deadline - now);
        }
        true
    }

    /// Register a completion listener.
    ///
    /// Runs immediately on the calling thread if the promise is already
    /// terminal; otherwise on whichever thread performs the terminal
    /// transition. Listeners must not assume a particular thread and must be
    /// reentrant-safe.
    pub fn on_complete<F>(&self, listener: F)
    where
        F: FnOnce(&FutureState) + Send + 'static,
    {
        let state = {
            let mut cell = self.inner.cell.lock();
            if !cell.state.is_terminal() {
                cell.listeners.push(Box::new(listener));
                return;
            }
            cell.state.clone()
        };
        listener(&state);
    }
}

impl std::fmt::Debug for CompletionFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionFuture")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn test_first_terminal_transition_wins() {
        let promise = Promise::new();
        assert!(promise.try_complete());
        assert!(!promise.try_fail(Arc::new(Boom)));
        assert!(!promise.try_cancel());
        assert!(!promise.try_complete());
        assert!(promise.future().is_succeeded());
    }

    #[test]
    fn test_erroring_setters_raise_after_terminal() {
        let promise = Promise::new();
        promise.complete().unwrap();
        assert!(matches!(promise.complete(), Err(PromiseError::AlreadyComplete)));
        assert!(matches!(
            promise.fail(Arc::new(Boom)),
            Err(PromiseError::AlreadyComplete)
        ));
        assert!(matches!(promise.cancel(), Err(PromiseError::AlreadyComplete)));
    }

    #[test]
    fn test_uncancellable_blocks_cancellation() {
        let promise = Promise::new();
        assert!(promise.set_uncancellable());
        assert!(promise.set_uncancellable());
        assert!(!promise.try_cancel());
        assert!(promise.try_complete());
        assert!(!promise.set_uncancellable());
    }

    #[test]
    fn test_fault_carries_causes() {
        let promise = Promise::new();
        assert!(promise.try_fail_all(vec![Arc::new(Boom) as Cause, Arc::new(Boom) as Cause]));
        let future = promise.future();
        assert!(future.is_faulted());
        assert_eq!(future.causes().len(), 2);
    }

    #[test]
    fn test_listener_runs_on_completion() {
        let promise = Promise::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = hits.clone();
        promise.future().on_complete(move |state| {
            assert!(state.is_terminal());
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        promise.try_complete();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Registered after completion: runs inline.
        let hits_clone = hits.clone();
        promise.future().on_complete(move |_| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wait_unblocks_on_completion() {
        let promise = Promise::new();
        let future = promise.future();

        let waiter = thread::spawn(move || {
            future.wait();
        });

        thread::sleep(Duration::from_millis(20));
        promise.try_complete();
        waiter.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_expires_while_pending() {
        let promise = Promise::new();
        assert!(!promise.future().wait_timeout(Duration::from_millis(20)));
        promise.try_complete();
        assert!(promise.future().wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_concurrent_completion_has_one_winner() {
        let promise = Promise::new();
        let wins = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..8 {
            let promise = promise.clone();
            let wins = wins.clone();
            handles.push(thread::spawn(move || {
                let won = if i % 2 == 0 {
                    promise.try_complete()
                } else {
                    promise.try_fail(Arc::new(Boom))
                };
                if won {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert!(promise.is_done());
    }

    #[test]
    fn test_state_value_round_trip() {
        let promise = Promise::new();
        promise.set_state_value(Box::new(42u32));
        let value = promise.take_state_value().unwrap();
        assert_eq!(*value.downcast::<u32>().unwrap(), 42);
        assert!(promise.take_state_value().is_none());
    }
}
