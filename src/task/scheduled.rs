//! Delayed and periodic tasks.
//!
//! A scheduled task carries an absolute deadline, an optional fixed-rate
//! period, a completion promise, and the slot index the schedule queue uses
//! for O(log n) removal. Cancellation races execution through an atomic
//! tri-state: exactly one of {cancel, run} wins for one-shot tasks.

use log::error;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{panic_message, TaskPanic};
use crate::promise::{Cause, Promise};

/// No enqueued position; the task is not currently on the heap.
pub(crate) const NOT_QUEUED: usize = usize::MAX;

/// Cancellation tri-state. Transitions are CAS-only:
/// `WAITING -> CANCELLED` (cancel wins) or `WAITING -> RUNNING` (run wins);
/// periodic tasks additionally allow `RUNNING -> CANCELLED` (stop re-arming)
/// and `RUNNING -> WAITING` (re-arm after a successful run).
const WAITING: u8 = 0;
const CANCELLED: u8 = 1;
const RUNNING: u8 = 2;

/// The stored body of a scheduled task.
pub(crate) enum ScheduledFn {
    /// One-shot closure, taken on the single run.
    Once(Option<Box<dyn FnOnce() + Send>>),
    /// Fixed-rate closure, invoked once per period.
    Periodic(Box<dyn FnMut() + Send>),
}

/// Result of attempting to run a scheduled task.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    /// One-shot body ran and the completion promise was resolved.
    Finished,
    /// The body panicked; the completion promise records the failure.
    Failed,
    /// Periodic body ran; the task re-armed with its next deadline.
    Reschedule,
    /// The task was cancelled before (or, for periodic tasks, during) the run.
    Skipped,
}

/// A task with a deadline, owned by one executor's schedule queue.
pub(crate) struct ScheduledTask {
    /// Tie-break for equal deadlines; lower sequence runs first.
    seq: u64,
    /// Absolute deadline; re-armed by the owning thread for periodic tasks.
    deadline: Mutex<Instant>,
    period: Option<Duration>,
    cancel_state: AtomicU8,
    /// Current slot in the owning heap, or [`NOT_QUEUED`].
    heap_index: AtomicUsize,
    body: Mutex<ScheduledFn>,
    completion: Promise,
}

impl ScheduledTask {
    pub(crate) fn once<F>(seq: u64, deadline: Instant, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            seq,
            deadline: Mutex::new(deadline),
            period: None,
            cancel_state: AtomicU8::new(WAITING),
            heap_index: AtomicUsize::new(NOT_QUEUED),
            body: Mutex::new(ScheduledFn::Once(Some(Box::new(f)))),
            completion: Promise::new(),
        }
    }

    pub(crate) fn periodic<F>(seq: u64, deadline: Instant, period: Duration, f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self {
            seq,
            deadline: Mutex::new(deadline),
            period: Some(period),
            cancel_state: AtomicU8::new(WAITING),
            heap_index: AtomicUsize::new(NOT_QUEUED),
            body: Mutex::new(ScheduledFn::Periodic(Box::new(f))),
            completion: Promise::new(),
        }
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn deadline(&self) -> Instant {
        *self.deadline.lock()
    }

    pub(crate) fn is_periodic(&self) -> bool {
        self.period.is_some()
    }

    pub(crate) fn completion(&self) -> &Promise {
        &self.completion
    }

    pub(crate) fn heap_index(&self) -> usize {
        self.heap_index.load(Ordering::Relaxed)
    }

    pub(crate) fn set_heap_index(&self, index: usize) {
        self.heap_index.store(index, Ordering::Relaxed);
    }

    /// Deadline-then-sequence ordering used by the schedule queue.
    pub(crate) fn is_before(&self, other: &ScheduledTask) -> bool {
        let mine = self.deadline();
        let theirs = other.deadline();
        mine < theirs || (mine == theirs && self.seq < other.seq)
    }

    /// Request cancellation from any thread.
    ///
    /// Returns true iff this call won the race: the body will never run again
    /// and the completion promise has been marked canceled. A one-shot task
    /// that already entered execution cannot be cancelled; a periodic task
    /// can, which prevents its re-arm.
    pub(crate) fn cancel(&self) -> bool {
        loop {
            match self.cancel_state.load(Ordering::SeqCst) {
                WAITING => {
                    if self
                        .cancel_state
                        .compare_exchange(WAITING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        self.completion.try_cancel();
                        return true;
                    }
                }
                RUNNING if self.is_periodic() => {
                    if self
                        .cancel_state
                        .compare_exchange(RUNNING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        self.completion.try_cancel();
                        return true;
                    }
                }
                _ => return false,
            }
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel_state.load(Ordering::SeqCst) == CANCELLED
    }

    /// Run the task body on the owning thread.
    pub(crate) fn run(&self) -> RunOutcome {
        if self
            .cancel_state
            .compare_exchange(WAITING, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return RunOutcome::Skipped;
        }

        if self.is_periodic() {
            self.run_periodic()
        } else {
            self.run_once()
        }
    }

    fn run_once(&self) -> RunOutcome {
        // Once execution starts the promise may no longer be cancelled out
        // from under the body.
        if !self.completion.set_uncancellable() {
            return RunOutcome::Skipped;
        }

        let body = match &mut *self.body.lock() {
            ScheduledFn::Once(slot) => slot.take(),
            ScheduledFn::Periodic(_) => None,
        };
        let Some(body) = body else {
            return RunOutcome::Skipped;
        };

        match catch_unwind(AssertUnwindSafe(body)) {
            Ok(()) => {
                self.completion.complete_or_warn("completing scheduled task");
                RunOutcome::Finished
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("uncaught scheduled task panic: {message}");
                let cause: Cause = Arc::new(TaskPanic(message));
                self.completion.try_fail(cause);
                RunOutcome::Failed
            }
        }
    }

    fn run_periodic(&self) -> RunOutcome {
        let result = {
            let mut body = self.body.lock();
            let ScheduledFn::Periodic(f) = &mut *body else {
                return RunOutcome::Skipped;
            };
            catch_unwind(AssertUnwindSafe(|| f()))
        };

        if let Err(payload) = result {
            let message = panic_message(payload.as_ref());
            error!("uncaught periodic task panic: {message}");
            let cause: Cause = Arc::new(TaskPanic(message));
            self.completion.try_fail(cause);
            return RunOutcome::Failed;
        }

        // Re-arm at a fixed rate unless a cancel landed mid-run.
        match self
            .cancel_state
            .compare_exchange(RUNNING, WAITING, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {
                let period = self.period.unwrap_or_default();
                let mut deadline = self.deadline.lock();
                *deadline += period;
                RunOutcome::Reschedule
            }
            Err(_) => RunOutcome::Skipped,
        }
    }
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("seq", &self.seq)
            .field("deadline", &self.deadline())
            .field("period", &self.period)
            .finish()
    }
}
