//! Overload policies for a full task queue.
//!
//! When the bounded immediate queue refuses an enqueue, the configured
//! [`RejectionHandler`] decides what happens: fail fast, or block the
//! producer and retry on a backoff schedule. Handlers run on the submitting
//! thread; an event-loop thread rejecting its own submission always fails
//! fast, since blocking there would stall the only consumer.

use log::warn;
use rand::Rng;
use std::thread;
use std::time::Duration;

use super::single_thread::SingleThreadExecutor;
use crate::error::ExecutorError;
use crate::task::Task;

/// Decides the fate of a task the queue refused.
pub trait RejectionHandler: Send + Sync {
    /// Handle `task`, which `executor`'s queue just refused.
    ///
    /// Implementations may retry via [`SingleThreadExecutor::offer`] (pairing
    /// retries with [`SingleThreadExecutor::wakeup`] so the consumer drains),
    /// or give up with [`ExecutorError::RejectedExecution`]. Returning `Ok`
    /// means the task was eventually admitted.
    fn rejected(&self, task: Task, executor: &SingleThreadExecutor) -> Result<(), ExecutorError>;
}

/// Fail fast: every rejected task raises
/// [`ExecutorError::RejectedExecution`]. The default policy.
#[derive(Debug, Default)]
pub struct Reject;

impl RejectionHandler for Reject {
    fn rejected(&self, _task: Task, executor: &SingleThreadExecutor) -> Result<(), ExecutorError> {
        warn!(
            "executor '{}': queue full ({} tasks), rejecting submission",
            executor.name(),
            executor.backlog_len()
        );
        Err(ExecutorError::RejectedExecution)
    }
}

/// Block the producer and retry at a fixed interval, up to a bounded number
/// of attempts.
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    max_attempts: usize,
    delay: Duration,
}

impl FixedBackoff {
    /// Retry up to `max_attempts` times, sleeping `delay` between attempts.
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl RejectionHandler for FixedBackoff {
    fn rejected(&self, task: Task, executor: &SingleThreadExecutor) -> Result<(), ExecutorError> {
        retry_with(task, executor, self.max_attempts, |_| self.delay)
    }
}

/// Block the producer and retry with exponentially growing, jittered delays.
///
/// The delay for attempt `n` is a random point in `[min_delay, cap]` where
/// the cap doubles per attempt starting at `min_delay` and never exceeds
/// `max_delay`. The random point decorrelates producers hammering the same
/// full queue.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_attempts: usize,
    min_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    /// Retry up to `max_attempts` times with delays between `min_delay` and
    /// `max_delay`. Requires `max_attempts > 0` and
    /// `0 < min_delay <= max_delay`.
    pub fn new(
        max_attempts: usize,
        min_delay: Duration,
        max_delay: Duration,
    ) -> Result<Self, ExecutorError> {
        if max_attempts == 0 {
            return Err(ExecutorError::InvalidArgument(
                "backoff needs at least one attempt".to_string(),
            ));
        }
        if min_delay.is_zero() || min_delay > max_delay {
            return Err(ExecutorError::InvalidArgument(
                "backoff delays must satisfy 0 < min <= max".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            min_delay,
            max_delay,
        })
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        let exponent = u32::try_from(attempt.min(32)).unwrap_or(32);
        let cap = self
            .min_delay
            .checked_mul(2u32.saturating_pow(exponent))
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        if cap <= self.min_delay {
            return self.min_delay;
        }
        rand::rng().random_range(self.min_delay..=cap)
    }
}

impl RejectionHandler for ExponentialBackoff {
    fn rejected(&self, task: Task, executor: &SingleThreadExecutor) -> Result<(), ExecutorError> {
        retry_with(task, executor, self.max_attempts, |attempt| {
            self.delay_for(attempt)
        })
    }
}

/// Shared retry loop: wake the consumer, sleep, offer again.
fn retry_with(
    mut task: Task,
    executor: &SingleThreadExecutor,
    max_attempts: usize,
    delay_for: impl Fn(usize) -> Duration,
) -> Result<(), ExecutorError> {
    // Blocking the loop on its own full queue would deadlock it.
    if executor.in_event_loop() {
        return Err(ExecutorError::RejectedExecution);
    }

    for attempt in 0..max_attempts {
        executor.wakeup();
        thread::sleep(delay_for(attempt));
        if executor.is_shutdown() {
            return Err(ExecutorError::Terminated);
        }
        match executor.offer(task) {
            Ok(()) => {
                executor.wakeup();
                return Ok(());
            }
            Err(refused) => task = refused,
        }
    }

    warn!(
        "executor '{}': queue still full after {max_attempts} backoff attempts",
        executor.name()
    );
    Err(ExecutorError::RejectedExecution)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delays_stay_between_min_and_doubling_cap() {
        let backoff =
            ExponentialBackoff::new(5, Duration::from_millis(10), Duration::from_millis(50))
                .unwrap();
        assert_eq!(backoff.delay_for(0), Duration::from_millis(10));
        for _ in 0..100 {
            let second = backoff.delay_for(1);
            assert!(second >= Duration::from_millis(10));
            assert!(second <= Duration::from_millis(20));

            // Deep attempts are clamped to the configured maximum.
            let late = backoff.delay_for(60);
            assert!(late >= Duration::from_millis(10));
            assert!(late <= Duration::from_millis(50));
        }
    }

    #[test]
    fn test_exponential_backoff_validates_its_bounds() {
        assert!(matches!(
            ExponentialBackoff::new(0, Duration::from_millis(10), Duration::from_millis(50)),
            Err(ExecutorError::InvalidArgument(_))
        ));
        assert!(matches!(
            ExponentialBackoff::new(3, Duration::ZERO, Duration::from_millis(50)),
            Err(ExecutorError::InvalidArgument(_))
        ));
        assert!(matches!(
            ExponentialBackoff::new(3, Duration::from_millis(60), Duration::from_millis(50)),
            Err(ExecutorError::InvalidArgument(_))
        ));
    }
}
