//! Deadline-ordered queue of scheduled tasks.
//!
//! An index-tracking binary min-heap: each task records its current slot so
//! arbitrary removal (for cancellation) stays O(log n). Ordering is by
//! deadline, with the task sequence number breaking ties so equal deadlines
//! run in submission order. The queue is owned exclusively by its executor's
//! thread; it is not a shared structure.

use std::sync::Arc;
use std::time::Instant;

use super::scheduled::{ScheduledTask, NOT_QUEUED};

/// Min-heap of pending scheduled tasks.
pub(crate) struct ScheduleQueue {
    heap: Vec<Arc<ScheduledTask>>,
}

impl ScheduleQueue {
    pub(crate) fn new() -> Self {
        Self { heap: Vec::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Insert a task, O(log n).
    pub(crate) fn push(&mut self, task: Arc<ScheduledTask>) {
        let index = self.heap.len();
        task.set_heap_index(index);
        self.heap.push(task);
        self.sift_up(index);
    }

    /// The earliest deadline currently pending.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.first().map(|task| task.deadline())
    }

    /// Pop the earliest task, O(log n).
    pub(crate) fn pop(&mut self) -> Option<Arc<ScheduledTask>> {
        if self.heap.is_empty() {
            return None;
        }
        Some(self.remove_at(0))
    }

    /// Pop the earliest task iff its deadline has passed.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<Arc<ScheduledTask>> {
        match self.heap.first() {
            Some(task) if task.deadline() <= now => Some(self.remove_at(0)),
            _ => None,
        }
    }

    /// Remove an arbitrary task via its recorded slot, O(log n).
    ///
    /// Returns false if the task is not on this heap.
    pub(crate) fn remove(&mut self, task: &Arc<ScheduledTask>) -> bool {
        let index = task.heap_index();
        if index >= self.heap.len() || !Arc::ptr_eq(&self.heap[index], task) {
            return false;
        }
        self.remove_at(index);
        true
    }

    fn remove_at(&mut self, index: usize) -> Arc<ScheduledTask> {
        let task = self.heap.swap_remove(index);
        task.set_heap_index(NOT_QUEUED);
        if index < self.heap.len() {
            self.heap[index].set_heap_index(index);
            // The swapped-in element may violate the heap property in either
            // direction relative to its new position.
            self.sift_down(index);
            self.sift_up(index);
        }
        task
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !self.heap[index].is_before(&self.heap[parent]) {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut smallest = left;
            if right < len && self.heap[right].is_before(&self.heap[left]) {
                smallest = right;
            }
            if !self.heap[smallest].is_before(&self.heap[index]) {
                break;
            }
            self.swap(index, smallest);
            index = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.heap[a].set_heap_index(a);
        self.heap[b].set_heap_index(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn task(seq: u64, millis: u64) -> Arc<ScheduledTask> {
        let deadline = Instant::now() + Duration::from_millis(millis);
        Arc::new(ScheduledTask::once(seq, deadline, || {}))
    }

    #[test]
    fn test_pop_orders_by_deadline() {
        let mut queue = ScheduleQueue::new();
        let first = task(0, 10);
        let second = task(1, 20);
        let third = task(2, 30);

        queue.push(third.clone());
        queue.push(first.clone());
        queue.push(second.clone());

        assert_eq!(queue.pop().unwrap().seq(), first.seq());
        assert_eq!(queue.pop().unwrap().seq(), second.seq());
        assert_eq!(queue.pop().unwrap().seq(), third.seq());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_equal_deadlines_pop_in_sequence_order() {
        let mut queue = ScheduleQueue::new();
        let deadline = Instant::now() + Duration::from_millis(10);
        let tasks: Vec<_> = (0..8u64)
            .map(|seq| Arc::new(ScheduledTask::once(seq, deadline, || {})))
            .collect();

        for t in tasks.iter().rev() {
            queue.push(t.clone());
        }
        for expected in 0..8u64 {
            assert_eq!(queue.pop().unwrap().seq(), expected);
        }
    }

    #[test]
    fn test_pop_due_respects_deadline() {
        let mut queue = ScheduleQueue::new();
        queue.push(task(0, 0));
        queue.push(task(1, 60_000));

        let now = Instant::now();
        assert_eq!(queue.pop_due(now).unwrap().seq(), 0);
        assert!(queue.pop_due(now).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_arbitrary_task() {
        let mut queue = ScheduleQueue::new();
        let tasks: Vec<_> = (0..10u64).map(|seq| task(seq, 10 * (seq + 1))).collect();
        for t in &tasks {
            queue.push(t.clone());
        }

        assert!(queue.remove(&tasks[4]));
        assert!(!queue.remove(&tasks[4]));
        assert_eq!(queue.len(), 9);

        let mut popped = Vec::new();
        while let Some(t) = queue.pop() {
            popped.push(t.seq());
        }
        assert_eq!(popped, vec![0, 1, 2, 3, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_remove_rejects_foreign_task() {
        let mut queue = ScheduleQueue::new();
        queue.push(task(0, 10));
        let foreign = task(1, 10);
        assert!(!queue.remove(&foreign));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_pop_clears_the_recorded_index() {
        let mut queue = ScheduleQueue::new();
        let t = task(0, 10);
        queue.push(t.clone());
        assert!(queue.pop().is_some());
        assert_eq!(queue.len(), 0);
        assert!(!queue.remove(&t));
    }

    #[test]
    fn test_next_deadline_tracks_minimum() {
        let mut queue = ScheduleQueue::new();
        assert!(queue.next_deadline().is_none());
        let late = task(0, 50);
        let early = task(1, 5);
        queue.push(late.clone());
        queue.push(early.clone());
        assert_eq!(queue.next_deadline().unwrap(), early.deadline());
    }
}
