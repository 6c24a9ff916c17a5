//! Units of work executed by an event loop.
//!
//! Every shape of work (plain actions, state-carrying actions, marshalled
//! control operations) is one [`Task`]: a boxed zero-argument closure that
//! captures whatever it needs and runs at most once. Panics raised by the
//! closure are isolated here and never reach the run loop.

mod queue;
mod scheduled;

pub(crate) use queue::ScheduleQueue;
pub(crate) use scheduled::{RunOutcome, ScheduledTask};

use log::error;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

use crate::promise::{Cause, Promise};

/// Failure cause recorded when a task body panics.
#[derive(Error, Debug)]
#[error("task panicked: {0}")]
pub struct TaskPanic(pub String);

/// Best-effort rendering of a panic payload for logs and failure causes.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<unknown panic>".to_string()
    }
}

/// A unit of work: a zero-argument closure invoked exactly once, optionally
/// tied to a promise that records the outcome.
pub struct Task {
    func: Box<dyn FnOnce() + Send>,
    promise: Option<Promise>,
}

impl Task {
    /// Create a task from a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            func: Box::new(f),
            promise: None,
        }
    }

    /// Create a task whose outcome is recorded on `promise`: success on a
    /// clean return, a [`TaskPanic`] failure otherwise.
    pub fn with_promise<F>(f: F, promise: Promise) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            func: Box::new(f),
            promise: Some(promise),
        }
    }

    /// Run the task, catching panics.
    ///
    /// A panic is logged and, when a promise is attached, recorded as its
    /// failure; it never propagates to the caller.
    pub(crate) fn run(self) {
        let result = catch_unwind(AssertUnwindSafe(self.func));
        match result {
            Ok(()) => {
                if let Some(promise) = self.promise {
                    promise.complete_or_warn("recording task success");
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("uncaught task panic: {message}");
                if let Some(promise) = self.promise {
                    let cause: Cause = Arc::new(TaskPanic(message));
                    promise.try_fail(cause);
                }
            }
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("has_promise", &self.promise.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promise::FutureState;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_task_runs_once() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        let task = Task::new(move || {
            ran_clone.store(true, Ordering::SeqCst);
        });
        task.run();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_clean_return_completes_promise() {
        let promise = Promise::new();
        let task = Task::with_promise(|| {}, promise.clone());
        task.run();
        assert!(matches!(promise.state(), FutureState::Succeeded));
    }

    #[test]
    fn test_panic_fails_promise_and_is_contained() {
        let promise = Promise::new();
        let future = promise.future();
        let task = Task::with_promise(|| panic!("exploded"), promise);
        task.run();
        assert!(future.is_faulted());
        assert_eq!(future.causes()[0].to_string(), "task panicked: exploded");
    }

    #[test]
    fn test_panic_without_promise_is_contained() {
        let task = Task::new(|| panic!("exploded"));
        task.run();
    }
}
