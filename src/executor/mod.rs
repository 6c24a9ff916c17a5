//! Event-loop executors.
//!
//! A [`SingleThreadExecutor`](single_thread::SingleThreadExecutor) binds one
//! OS thread to a bounded task queue and a deadline-ordered schedule queue;
//! an [`ExecutorGroup`](group::ExecutorGroup) pools several behind a chooser.
//! Admission overload is delegated to a pluggable
//! [`RejectionHandler`](rejection::RejectionHandler).

pub mod group;
pub mod queue;
pub mod rejection;
pub mod single_thread;

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use queue::QueueFactory;
use rejection::{Reject, RejectionHandler};

/// Lifecycle states of an executor; transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExecutorState {
    /// Constructed; the loop has not run its first iteration yet
    NotStarted = 0,
    /// The loop is processing tasks
    Started = 1,
    /// Graceful shutdown was requested; the loop is draining
    ShuttingDown = 2,
    /// The loop has stopped accepting and draining work
    Shutdown = 3,
    /// The loop has exited and the termination future is complete
    Terminated = 4,
}

impl ExecutorState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ExecutorState::NotStarted,
            1 => ExecutorState::Started,
            2 => ExecutorState::ShuttingDown,
            3 => ExecutorState::Shutdown,
            _ => ExecutorState::Terminated,
        }
    }
}

/// Produces and starts named, long-running worker threads.
///
/// The executor core depends only on "start this entry point under this
/// name"; substituting a factory is how tests inject spawn failures and how
/// embedders control thread parameters.
pub trait ThreadFactory: Send + Sync {
    /// Spawn a worker thread running `body`.
    fn spawn(&self, name: &str, body: Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>>;
}

/// Spawns workers through [`std::thread::Builder`].
#[derive(Debug, Default)]
pub struct DefaultThreadFactory;

impl ThreadFactory for DefaultThreadFactory {
    fn spawn(&self, name: &str, body: Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name(name.to_string()).spawn(body)
    }
}

/// Configuration for a single-thread executor.
#[derive(Clone)]
pub struct ExecutorConfig {
    /// Capacity of the bounded immediate task queue; fixed for the
    /// executor's lifetime.
    pub queue_capacity: usize,

    /// Name for the worker thread (groups append a member index).
    pub thread_name: String,

    /// Fairness budget for one uninterrupted batch of immediate tasks.
    /// Checked every 64 tasks to amortize the clock read; `None` drains the
    /// queue without a time bound.
    pub task_time_budget: Option<Duration>,

    /// Policy invoked when the immediate queue refuses an enqueue.
    pub rejection: Arc<dyn RejectionHandler>,

    /// Collaborator that produces the worker thread.
    pub thread_factory: Arc<dyn ThreadFactory>,

    /// Optional substitute for the immediate-queue implementation.
    pub queue_factory: Option<QueueFactory>,

    /// Resource-release hook run by the worker after the loop exits, before
    /// the state becomes `Terminated`.
    pub on_cleanup: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            thread_name: "strand-executor".to_string(),
            task_time_budget: None,
            rejection: Arc::new(Reject),
            thread_factory: Arc::new(DefaultThreadFactory),
            queue_factory: None,
            on_cleanup: None,
        }
    }
}

impl std::fmt::Debug for ExecutorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorConfig")
            .field("queue_capacity", &self.queue_capacity)
            .field("thread_name", &self.thread_name)
            .field("task_time_budget", &self.task_time_budget)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_ordering_follows_lifecycle() {
        assert!(ExecutorState::NotStarted < ExecutorState::Started);
        assert!(ExecutorState::Started < ExecutorState::ShuttingDown);
        assert!(ExecutorState::ShuttingDown < ExecutorState::Shutdown);
        assert!(ExecutorState::Shutdown < ExecutorState::Terminated);
    }

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [
            ExecutorState::NotStarted,
            ExecutorState::Started,
            ExecutorState::ShuttingDown,
            ExecutorState::Shutdown,
            ExecutorState::Terminated,
        ] {
            assert_eq!(ExecutorState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_default_config() {
        let config = ExecutorConfig::default();
        assert_eq!(config.queue_capacity, 1000);
        assert!(config.task_time_budget.is_none());
        assert!(config.queue_factory.is_none());
    }
}
