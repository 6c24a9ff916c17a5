//! Bounded FIFO task queues.
//!
//! The immediate task queue is the only structure shared between producer
//! threads and the event loop, so it must be thread-safe, bounded, and cheap
//! to size. [`TaskQueue`] is the seam callers can substitute through
//! [`crate::ExecutorConfig::queue_factory`]; the default implementation rides
//! on a bounded crossbeam channel.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Arc;

use crate::task::Task;

/// A thread-safe bounded FIFO of tasks: many producers, one consumer.
pub trait TaskQueue: Send + Sync {
    /// Enqueue without blocking; hands the task back when the queue is full.
    fn try_enqueue(&self, task: Task) -> Result<(), Task>;

    /// Dequeue without blocking.
    fn try_dequeue(&self) -> Option<Task>;

    /// Accurate count of queued tasks.
    fn len(&self) -> usize;

    /// True when no tasks are queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed capacity set at construction.
    fn capacity(&self) -> usize;
}

/// Factory for substituting a custom [`TaskQueue`] implementation; called
/// once per executor with the configured capacity.
pub type QueueFactory = Arc<dyn Fn(usize) -> Arc<dyn TaskQueue> + Send + Sync>;

/// Default queue: a bounded crossbeam channel holding both endpoints.
pub(crate) struct ChannelQueue {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
    capacity: usize,
}

impl ChannelQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }
}

impl TaskQueue for ChannelQueue {
    fn try_enqueue(&self, task: Task) -> Result<(), Task> {
        self.sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => task,
            TrySendError::Disconnected(task) => task,
        })
    }

    fn try_dequeue(&self) -> Option<Task> {
        self.receiver.try_recv().ok()
    }

    fn len(&self) -> usize {
        self.receiver.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
