//! Pools of single-thread executors behind a selection policy.
//!
//! A group spawns a fixed set of members eagerly at construction and hands
//! out one per submission via its [`Chooser`]. Work pinned to one member stays
//! serial; unrelated work spreads across members.

use log::{debug, warn};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::single_thread::{ScheduledHandle, SingleThreadExecutor};
use super::ExecutorConfig;
use crate::error::ExecutorError;
use crate::promise::{CompletionFuture, Promise, PromiseCombiner};

/// Grace window used when rolling back partially constructed groups.
const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(15);

/// Picks the member that receives the next submission.
pub trait Chooser: Send + Sync {
    /// Return the index of the chosen member. `members` is never empty.
    fn choose(&self, members: &[SingleThreadExecutor]) -> usize;
}

/// Cycles through members in order; the default policy.
#[derive(Debug, Default)]
pub struct RoundRobinChooser {
    next: AtomicUsize,
}

impl Chooser for RoundRobinChooser {
    fn choose(&self, members: &[SingleThreadExecutor]) -> usize {
        let ticket = self.next.fetch_add(1, Ordering::Relaxed);
        if members.len().is_power_of_two() {
            ticket & (members.len() - 1)
        } else {
            ticket % members.len()
        }
    }
}

/// Samples two random members and picks the one with the shorter backlog.
/// Smooths load when task costs are uneven, at the price of giving up the
/// strict rotation order.
#[derive(Debug, Default)]
pub struct PowerOfTwoChooser;

impl Chooser for PowerOfTwoChooser {
    fn choose(&self, members: &[SingleThreadExecutor]) -> usize {
        if members.len() == 1 {
            return 0;
        }
        let mut rng = rand::rng();
        let first = rng.random_range(0..members.len());
        let second = rng.random_range(0..members.len());
        if members[second].backlog_len() < members[first].backlog_len() {
            second
        } else {
            first
        }
    }
}

/// A fixed-size pool of [`SingleThreadExecutor`] members.
///
/// All members are constructed (threads spawned) before `new` returns; a
/// spawn failure rolls back the members already started and surfaces the
/// error.
pub struct ExecutorGroup {
    members: Vec<SingleThreadExecutor>,
    chooser: Arc<dyn Chooser>,
}

impl ExecutorGroup {
    /// Create a group of `size` default-configured members with round-robin
    /// selection.
    pub fn new(size: usize) -> Result<Self, ExecutorError> {
        Self::with_config(
            size,
            ExecutorConfig::default(),
            Arc::new(RoundRobinChooser::default()),
        )
    }

    /// Create a group with one member per available CPU core.
    pub fn per_core() -> Result<Self, ExecutorError> {
        Self::new(num_cpus::get())
    }

    /// Create a group of `size` members sharing `config` (each member's
    /// thread name gets a `-<index>` suffix), selected by `chooser`.
    pub fn with_config(
        size: usize,
        config: ExecutorConfig,
        chooser: Arc<dyn Chooser>,
    ) -> Result<Self, ExecutorError> {
        if size == 0 {
            return Err(ExecutorError::InvalidArgument(
                "group size must be at least 1".to_string(),
            ));
        }

        let mut members: Vec<SingleThreadExecutor> = Vec::with_capacity(size);
        for index in 0..size {
            let mut member_config = config.clone();
            member_config.thread_name = format!("{}-{index}", config.thread_name);
            match SingleThreadExecutor::with_config(member_config) {
                Ok(member) => members.push(member),
                Err(error) => {
                    warn!(
                        "group '{}': member {index} failed to start, rolling back {} member(s): {error}",
                        config.thread_name,
                        members.len()
                    );
                    for member in &members {
                        // Validated windows, so this cannot fail.
                        let _ = member.shutdown_gracefully(Duration::ZERO, ROLLBACK_TIMEOUT);
                    }
                    for member in &members {
                        member.termination_future().wait();
                    }
                    return Err(error);
                }
            }
        }

        debug!("group '{}': started {size} member(s)", config.thread_name);
        Ok(Self { members, chooser })
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false; groups have at least one member.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The member that would receive the next submission. Callers pinning
    /// related work to one loop should grab a member here once and clone it.
    pub fn next(&self) -> &SingleThreadExecutor {
        &self.members[self.chooser.choose(&self.members)]
    }

    /// Iterate over all members.
    pub fn iter(&self) -> impl Iterator<Item = &SingleThreadExecutor> {
        self.members.iter()
    }

    /// Submit a task to the next chosen member.
    pub fn execute<F>(&self, f: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.next().execute(f)
    }

    /// Schedule a one-shot task on the next chosen member.
    pub fn schedule<F>(&self, f: F, delay: Duration) -> Result<ScheduledHandle, ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.next().schedule(f, delay)
    }

    /// Schedule a fixed-rate task on the next chosen member.
    pub fn schedule_at_fixed_rate<F>(
        &self,
        f: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<ScheduledHandle, ExecutorError>
    where
        F: FnMut() + Send + 'static,
    {
        self.next()
            .schedule_at_fixed_rate(f, initial_delay, period)
    }

    /// True once every member is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.members.iter().all(SingleThreadExecutor::is_shutting_down)
    }

    /// True once every member has stopped draining work.
    pub fn is_shutdown(&self) -> bool {
        self.members.iter().all(SingleThreadExecutor::is_shutdown)
    }

    /// True once every member has terminated.
    pub fn is_terminated(&self) -> bool {
        self.members.iter().all(SingleThreadExecutor::is_terminated)
    }

    /// Future that completes when every member has terminated.
    pub fn termination_future(&self) -> CompletionFuture {
        aggregate_termination(&self.members)
    }

    /// Request graceful shutdown of every member with the same windows and
    /// return a future for the whole group's termination.
    pub fn shutdown_gracefully(
        &self,
        quiet_period: Duration,
        timeout: Duration,
    ) -> Result<CompletionFuture, ExecutorError> {
        for member in &self.members {
            member.shutdown_gracefully(quiet_period, timeout)?;
        }
        Ok(aggregate_termination(&self.members))
    }
}

impl std::fmt::Debug for ExecutorGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorGroup")
            .field("members", &self.members.len())
            .finish()
    }
}

fn aggregate_termination(members: &[SingleThreadExecutor]) -> CompletionFuture {
    let combiner = PromiseCombiner::new();
    for member in members {
        // The combiner is local and unsealed; add cannot fail.
        let _ = combiner.add(&member.termination_future());
    }
    let aggregate = Promise::new();
    let future = aggregate.future();
    let _ = combiner.finish(aggregate);
    future
}
