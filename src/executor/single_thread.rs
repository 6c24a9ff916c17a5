//! The single-thread event-loop executor.
//!
//! One dedicated OS thread owns a bounded FIFO of immediate tasks and a
//! deadline-ordered schedule queue. Producers on any thread submit work; only
//! the owning thread dequeues and runs it, which is what guarantees serial,
//! ordered execution. The loop drains due scheduled tasks into the FIFO,
//! runs batches under an optional fairness budget, parks when idle, and
//! drives the graceful-shutdown state machine once requested.
//!
//! Cross-thread discipline: the schedule queue and the shutdown-hook list are
//! touched only by the owning thread. Foreign threads marshal mutations onto
//! it as ordinary tasks; the FIFO queue is the sole shared structure.

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::queue::{ChannelQueue, TaskQueue};
use super::{ExecutorConfig, ExecutorState};
use crate::error::ExecutorError;
use crate::promise::{CompletionFuture, Promise};
use crate::task::{panic_message, RunOutcome, ScheduleQueue, ScheduledTask, Task};

thread_local! {
    /// Published once by each executor's loop on entry, never cleared; lets
    /// code running on a loop thread discover its own executor.
    static CURRENT: RefCell<Option<Arc<Shared>>> = const { RefCell::new(None) };
}

/// How long `confirm_shutdown` naps while inside the quiet period, giving
/// late-arriving tasks a chance to appear.
const QUIET_PERIOD_POLL: Duration = Duration::from_millis(100);

/// Batch size between fairness-budget clock reads.
const BUDGET_CHECK_INTERVAL: u64 = 64;

/// State shared between executor handles and the worker thread.
struct Shared {
    name: String,
    state: AtomicU8,
    queue: Arc<dyn TaskQueue>,
    /// Owning-thread only; the lock is uncontended by construction.
    schedule: Mutex<ScheduleQueue>,
    /// Owning-thread only.
    hooks: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    wake_flag: Mutex<bool>,
    wake_cv: Condvar,
    /// Serializes the `ShuttingDown` transition with its parameter stores.
    shutdown_lock: Mutex<()>,
    progress: AtomicU64,
    start: Instant,
    last_execution_ns: AtomicU64,
    shutdown_start_ns: AtomicU64,
    quiet_period_ns: AtomicU64,
    timeout_ns: AtomicU64,
    seq: AtomicU64,
    termination: Promise,
    rejection: Arc<dyn super::rejection::RejectionHandler>,
    time_budget: Option<Duration>,
    on_cleanup: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Shared {
    fn state(&self) -> ExecutorState {
        ExecutorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn cas_state(&self, from: ExecutorState, to: ExecutorState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn store_state(&self, state: ExecutorState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Monotonic nanoseconds since executor construction.
    fn now_ns(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    fn wake(&self) {
        let mut woken = self.wake_flag.lock();
        *woken = true;
        self.wake_cv.notify_one();
    }
}

fn to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn current_shared() -> Option<Arc<Shared>> {
    CURRENT.with(|current| current.borrow().clone())
}

/// The executor running on the calling thread, if the caller is inside an
/// event loop.
pub fn current() -> Option<SingleThreadExecutor> {
    current_shared().map(|shared| SingleThreadExecutor { shared })
}

/// An executor bound to one dedicated OS thread.
///
/// Cloning yields another handle to the same executor. Executors keep their
/// thread alive until [`SingleThreadExecutor::shutdown_gracefully`] completes,
/// so every executor should eventually be shut down.
#[derive(Clone)]
pub struct SingleThreadExecutor {
    shared: Arc<Shared>,
}

impl SingleThreadExecutor {
    /// Create an executor with the default configuration.
    pub fn new() -> Result<Self, ExecutorError> {
        Self::with_config(ExecutorConfig::default())
    }

    /// Create an executor, spawning its worker thread eagerly.
    pub fn with_config(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        if config.queue_capacity == 0 {
            return Err(ExecutorError::InvalidArgument(
                "queue capacity must be at least 1".to_string(),
            ));
        }

        let queue: Arc<dyn TaskQueue> = match &config.queue_factory {
            Some(factory) => factory(config.queue_capacity),
            None => Arc::new(ChannelQueue::new(config.queue_capacity)),
        };

        let shared = Arc::new(Shared {
            name: config.thread_name.clone(),
            state: AtomicU8::new(ExecutorState::NotStarted as u8),
            queue,
            schedule: Mutex::new(ScheduleQueue::new()),
            hooks: Mutex::new(Vec::new()),
            wake_flag: Mutex::new(false),
            wake_cv: Condvar::new(),
            shutdown_lock: Mutex::new(()),
            progress: AtomicU64::new(0),
            start: Instant::now(),
            last_execution_ns: AtomicU64::new(0),
            shutdown_start_ns: AtomicU64::new(0),
            quiet_period_ns: AtomicU64::new(0),
            timeout_ns: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            termination: Promise::new(),
            rejection: Arc::clone(&config.rejection),
            time_budget: config.task_time_budget,
            on_cleanup: config.on_cleanup.clone(),
        });

        let worker = Arc::clone(&shared);
        let _ = config
            .thread_factory
            .spawn(&config.thread_name, Box::new(move || run_loop(worker)))?;

        Ok(Self { shared })
    }

    /// The configured worker thread name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExecutorState {
        self.shared.state()
    }

    /// True once graceful shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.state() >= ExecutorState::ShuttingDown
    }

    /// True once the loop has stopped draining work.
    pub fn is_shutdown(&self) -> bool {
        self.state() >= ExecutorState::Shutdown
    }

    /// True once the loop has exited and the termination future completed.
    pub fn is_terminated(&self) -> bool {
        self.state() == ExecutorState::Terminated
    }

    /// True when the calling thread is this executor's event loop.
    pub fn in_event_loop(&self) -> bool {
        current_shared().is_some_and(|shared| Arc::ptr_eq(&shared, &self.shared))
    }

    /// Monotonically increasing count of tasks run; a stalled value alongside
    /// a non-empty backlog indicates a blocked loop.
    pub fn progress(&self) -> u64 {
        self.shared.progress.load(Ordering::SeqCst)
    }

    /// Number of immediate tasks waiting in the queue.
    pub fn backlog_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Number of scheduled tasks whose deadlines have not yet migrated.
    pub fn scheduled_len(&self) -> usize {
        self.shared.schedule.lock().len()
    }

    /// True when no immediate tasks are waiting.
    pub fn is_backlog_empty(&self) -> bool {
        self.shared.queue.is_empty()
    }

    /// Submit a task for execution in arrival order.
    ///
    /// When the queue is full the configured rejection policy decides the
    /// outcome; when it gives up, this returns
    /// [`ExecutorError::RejectedExecution`].
    pub fn execute<F>(&self, f: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Task::new(f), true)
    }

    /// Like [`SingleThreadExecutor::execute`] but without waking the loop:
    /// a hint for callers batching submissions who expect a non-lazy task
    /// to follow. Liveness is only guaranteed once one does (or shutdown
    /// begins); admission semantics are identical to `execute`.
    pub fn lazy_execute<F>(&self, f: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Task::new(f), false)
    }

    /// Run `f` once after `delay`.
    pub fn schedule<F>(&self, f: F, delay: Duration) -> Result<ScheduledHandle, ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.check_admission()?;
        let task = Arc::new(ScheduledTask::once(
            self.shared.next_seq(),
            Instant::now() + delay,
            f,
        ));
        self.enqueue_scheduled(Arc::clone(&task))?;
        Ok(ScheduledHandle {
            task,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Run `f` every `period`, first after `initial_delay`, at a fixed rate:
    /// each successful run re-arms at `deadline + period`. The handle's
    /// completion future only resolves on cancellation or failure.
    pub fn schedule_at_fixed_rate<F>(
        &self,
        f: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<ScheduledHandle, ExecutorError>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            return Err(ExecutorError::InvalidArgument(
                "period must be greater than zero".to_string(),
            ));
        }
        self.check_admission()?;
        let task = Arc::new(ScheduledTask::periodic(
            self.shared.next_seq(),
            Instant::now() + initial_delay,
            period,
            f,
        ));
        self.enqueue_scheduled(Arc::clone(&task))?;
        Ok(ScheduledHandle {
            task,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Like [`SingleThreadExecutor::schedule`], tied to an external
    /// cancellation signal: when `signal` completes (in any way) before the
    /// task runs, the task is cancelled. An already-completed signal yields
    /// an immediately-cancelled handle without enqueuing anything.
    pub fn schedule_cancellable<F>(
        &self,
        f: F,
        delay: Duration,
        signal: &CompletionFuture,
    ) -> Result<ScheduledHandle, ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        if signal.is_done() {
            let task = Arc::new(ScheduledTask::once(
                self.shared.next_seq(),
                Instant::now() + delay,
                f,
            ));
            task.cancel();
            return Ok(ScheduledHandle {
                task,
                shared: Arc::clone(&self.shared),
            });
        }

        let handle = self.schedule(f, delay)?;
        let observer = handle.clone();
        signal.on_complete(move |_| {
            observer.cancel();
        });
        Ok(handle)
    }

    /// Register a callback run once during termination, after the queue has
    /// drained. Hook panics are isolated and logged.
    pub fn add_shutdown_hook<F>(&self, f: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.in_event_loop() {
            self.shared.hooks.lock().push(Box::new(f));
            Ok(())
        } else {
            let shared = Arc::clone(&self.shared);
            self.submit(
                Task::new(move || shared.hooks.lock().push(Box::new(f))),
                true,
            )
        }
    }

    /// Begin graceful shutdown and return the termination future.
    ///
    /// The loop keeps draining newly arriving tasks until none have run for
    /// `quiet_period`, bounded overall by `timeout` (which must be at least
    /// the quiet period). Repeat calls are no-ops returning the same future.
    pub fn shutdown_gracefully(
        &self,
        quiet_period: Duration,
        timeout: Duration,
    ) -> Result<CompletionFuture, ExecutorError> {
        if timeout < quiet_period {
            return Err(ExecutorError::InvalidArgument(format!(
                "timeout {timeout:?} must be at least the quiet period {quiet_period:?}"
            )));
        }

        let _transition = self.shared.shutdown_lock.lock();
        let state = self.shared.state();
        if state >= ExecutorState::ShuttingDown {
            return Ok(self.termination_future());
        }

        self.shared
            .quiet_period_ns
            .store(to_nanos(quiet_period), Ordering::SeqCst);
        self.shared
            .timeout_ns
            .store(to_nanos(timeout), Ordering::SeqCst);
        self.shared
            .shutdown_start_ns
            .store(self.shared.now_ns(), Ordering::SeqCst);
        self.shared.store_state(ExecutorState::ShuttingDown);
        debug!(
            "executor '{}': shutting down (quiet period {quiet_period:?}, timeout {timeout:?})",
            self.shared.name
        );

        if !self.in_event_loop() {
            self.shared.wake();
        }
        Ok(self.termination_future())
    }

    /// Future completed exactly once, at the end of the worker's run loop.
    pub fn termination_future(&self) -> CompletionFuture {
        self.shared.termination.future()
    }

    /// Raw admission without rejection handling: hands the task back when the
    /// queue is full. Intended for [`super::rejection::RejectionHandler`]
    /// implementations retrying an enqueue.
    pub fn offer(&self, task: Task) -> Result<(), Task> {
        self.shared.queue.try_enqueue(task)
    }

    /// Interrupt the loop's blocking wait so it re-examines its queues.
    pub fn wakeup(&self) {
        self.shared.wake();
    }

    fn check_admission(&self) -> Result<(), ExecutorError> {
        if self.shared.state() >= ExecutorState::Shutdown {
            return Err(ExecutorError::Terminated);
        }
        Ok(())
    }

    fn submit(&self, task: Task, wake: bool) -> Result<(), ExecutorError> {
        self.check_admission()?;
        match self.shared.queue.try_enqueue(task) {
            Ok(()) => {
                if wake && !self.in_event_loop() {
                    self.shared.wake();
                }
                Ok(())
            }
            Err(task) => {
                let rejection = Arc::clone(&self.shared.rejection);
                rejection.rejected(task, self)
            }
        }
    }

    /// Insert into the schedule queue, marshalling onto the owning thread
    /// when called from a foreign one.
    fn enqueue_scheduled(&self, task: Arc<ScheduledTask>) -> Result<(), ExecutorError> {
        if self.in_event_loop() {
            self.shared.schedule.lock().push(task);
            Ok(())
        } else {
            let shared = Arc::clone(&self.shared);
            self.submit(
                Task::new(move || {
                    // A cancel may have landed before the marshalled insert.
                    if !task.is_cancelled() {
                        shared.schedule.lock().push(task);
                    }
                }),
                true,
            )
        }
    }
}

impl std::fmt::Debug for SingleThreadExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleThreadExecutor")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("backlog", &self.backlog_len())
            .finish()
    }
}

/// Handle to a scheduled task: observe or cancel it from any thread.
#[derive(Clone)]
pub struct ScheduledHandle {
    task: Arc<ScheduledTask>,
    shared: Arc<Shared>,
}

impl ScheduledHandle {
    /// Cancel the task.
    ///
    /// Returns true iff this call prevented the body from ever running again
    /// and resolved the completion future as canceled; false when execution
    /// already won the race (one-shot) or the task was cancelled earlier.
    pub fn cancel(&self) -> bool {
        if !self.task.cancel() {
            return false;
        }

        // Drop the task from the schedule queue. Off-thread this is
        // marshalled best-effort: a cancelled task left on the heap is
        // skipped when it pops.
        let on_loop = current_shared().is_some_and(|shared| Arc::ptr_eq(&shared, &self.shared));
        if on_loop {
            self.shared.schedule.lock().remove(&self.task);
        } else {
            let shared = Arc::clone(&self.shared);
            let task = Arc::clone(&self.task);
            let removal = Task::new(move || {
                shared.schedule.lock().remove(&task);
            });
            if self.shared.queue.try_enqueue(removal).is_ok() {
                self.shared.wake();
            }
        }
        true
    }

    /// Completion future: succeeds after a one-shot run, fails on a panic,
    /// resolves canceled when cancellation wins.
    pub fn completion(&self) -> CompletionFuture {
        self.task.completion().future()
    }

    /// Absolute deadline of the next (or only) run.
    pub fn deadline(&self) -> Instant {
        self.task.deadline()
    }

    /// True for fixed-rate tasks.
    pub fn is_periodic(&self) -> bool {
        self.task.is_periodic()
    }
}

impl std::fmt::Debug for ScheduledHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledHandle")
            .field("deadline", &self.deadline())
            .field("periodic", &self.is_periodic())
            .finish()
    }
}

/// Worker thread entry point.
fn run_loop(shared: Arc<Shared>) {
    CURRENT.with(|current| {
        *current.borrow_mut() = Some(Arc::clone(&shared));
    });

    if shared.cas_state(ExecutorState::NotStarted, ExecutorState::Started) {
        debug!("executor '{}': event loop started", shared.name);
    }

    loop {
        migrate_due_tasks(&shared);
        let ran = run_batch(&shared);

        if shared.state() >= ExecutorState::ShuttingDown {
            if confirm_shutdown(&shared) {
                break;
            }
            continue;
        }

        if !ran {
            let next_deadline = shared.schedule.lock().next_deadline();
            park(&shared, next_deadline);
        }
    }

    shared.store_state(ExecutorState::Shutdown);
    if let Some(cleanup) = shared.on_cleanup.as_deref() {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| cleanup())) {
            warn!(
                "executor '{}': cleanup hook panicked: {}",
                shared.name,
                panic_message(payload.as_ref())
            );
        }
    }
    shared.store_state(ExecutorState::Terminated);
    shared.termination.try_complete();
    debug!("executor '{}': terminated", shared.name);
}

/// Move every scheduled task whose deadline has passed into the FIFO queue.
/// When the FIFO is full the task goes back on the heap and migration stops
/// for this round; scheduled work is never dropped.
fn migrate_due_tasks(shared: &Arc<Shared>) {
    loop {
        let due = shared.schedule.lock().pop_due(Instant::now());
        let Some(task) = due else {
            return;
        };
        if task.is_cancelled() {
            continue;
        }
        let wrapped = wrap_scheduled(shared, Arc::clone(&task));
        if shared.queue.try_enqueue(wrapped).is_err() {
            shared.schedule.lock().push(task);
            return;
        }
    }
}

/// Adapt a due scheduled task into an immediate task, re-arming periodic
/// tasks after a successful run.
fn wrap_scheduled(shared: &Arc<Shared>, task: Arc<ScheduledTask>) -> Task {
    let shared = Arc::clone(shared);
    Task::new(move || {
        if let RunOutcome::Reschedule = task.run() {
            if shared.state() < ExecutorState::ShuttingDown {
                shared.schedule.lock().push(Arc::clone(&task));
            } else {
                task.cancel();
            }
        }
    })
}

/// Run one batch of queued tasks: at most the backlog present at entry, and
/// no longer than the fairness budget. Bounding the sweep keeps a task that
/// resubmits itself from pinning the loop in a single batch.
fn run_batch(shared: &Shared) -> bool {
    let batch_start = Instant::now();
    let mut remaining = shared.queue.len();
    let mut ran: u64 = 0;

    while remaining > 0 {
        let Some(task) = shared.queue.try_dequeue() else {
            break;
        };
        task.run();
        ran += 1;
        remaining -= 1;
        shared.progress.fetch_add(1, Ordering::SeqCst);
        shared
            .last_execution_ns
            .store(shared.now_ns(), Ordering::SeqCst);

        if ran % BUDGET_CHECK_INTERVAL == 0 {
            if let Some(budget) = shared.time_budget {
                if batch_start.elapsed() >= budget {
                    break;
                }
            }
        }
    }
    ran > 0
}

/// Drain one sweep of the backlog without a fairness budget, bounded to the
/// length at entry so the timeout check between sweeps stays reachable.
fn run_all_tasks(shared: &Shared) -> bool {
    let mut remaining = shared.queue.len();
    let mut ran = false;
    while remaining > 0 {
        let Some(task) = shared.queue.try_dequeue() else {
            break;
        };
        task.run();
        ran = true;
        remaining -= 1;
        shared.progress.fetch_add(1, Ordering::SeqCst);
        shared
            .last_execution_ns
            .store(shared.now_ns(), Ordering::SeqCst);
    }
    ran
}

/// Cancel every pending scheduled task; their completion futures resolve
/// canceled. Cancellation runs outside the schedule lock because completion
/// listeners may call back into this executor.
fn cancel_scheduled_tasks(shared: &Shared) {
    let mut pending = Vec::new();
    {
        let mut schedule = shared.schedule.lock();
        while let Some(task) = schedule.pop() {
            pending.push(task);
        }
    }
    for task in pending {
        task.cancel();
    }
}

/// Run and clear the shutdown hooks, isolating panics per hook.
fn run_shutdown_hooks(shared: &Shared) -> bool {
    let hooks = std::mem::take(&mut *shared.hooks.lock());
    let ran = !hooks.is_empty();
    for hook in hooks {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(hook)) {
            warn!(
                "executor '{}': shutdown hook panicked: {}",
                shared.name,
                panic_message(payload.as_ref())
            );
        }
    }
    ran
}

/// One round of the shutdown drain. Returns true when the loop may finish:
/// nothing ran this round, the quiet period has lapsed since the last task
/// execution (or the hard timeout has passed), and the queue is empty.
fn confirm_shutdown(shared: &Arc<Shared>) -> bool {
    cancel_scheduled_tasks(shared);
    let ran_tasks = run_all_tasks(shared);
    let ran_hooks = run_shutdown_hooks(shared);

    let now = shared.now_ns();
    let shutdown_elapsed = now.saturating_sub(shared.shutdown_start_ns.load(Ordering::SeqCst));
    let timeout = shared.timeout_ns.load(Ordering::SeqCst);

    if ran_tasks || ran_hooks {
        if shutdown_elapsed > timeout {
            return true;
        }
        // More work may have been re-armed by what just ran.
        shared.wake();
        return false;
    }

    if shutdown_elapsed > timeout {
        return true;
    }

    let quiet_period = shared.quiet_period_ns.load(Ordering::SeqCst);
    let since_last_task = now.saturating_sub(shared.last_execution_ns.load(Ordering::SeqCst));
    if since_last_task <= quiet_period {
        shared.wake();
        thread::sleep(QUIET_PERIOD_POLL);
        return false;
    }

    true
}

/// Block until woken, until the next scheduled deadline, or until a task
/// arrives (producers set the wake flag after enqueuing).
fn park(shared: &Shared, next_deadline: Option<Instant>) {
    let mut woken = shared.wake_flag.lock();
    if *woken {
        *woken = false;
        return;
    }
    if !shared.queue.is_empty() {
        return;
    }
    match next_deadline {
        None => {
            shared.wake_cv.wait(&mut woken);
        }
        Some(deadline) => {
            let now = Instant::now();
            if deadline <= now {
                return;
            }
            let _ = shared.wake_cv.wait_for(&mut woken, deadline - now);
        }
    }
    *woken = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_execute_runs_task_and_advances_progress() {
        let executor = SingleThreadExecutor::new().unwrap();
        let promise = Promise::new();
        let done = promise.future();

        let inner = promise.clone();
        executor.execute(move || {
            inner.try_complete();
        })
        .unwrap();

        assert!(done.wait_timeout(Duration::from_secs(2)));
        assert!(executor.progress() >= 1);
        executor
            .shutdown_gracefully(Duration::ZERO, Duration::from_secs(5))
            .unwrap()
            .wait();
    }

    #[test]
    fn test_current_is_published_on_the_loop_thread() {
        let executor = SingleThreadExecutor::new().unwrap();
        assert!(current().is_none());
        assert!(!executor.in_event_loop());

        let probe = SingleThreadExecutor::clone(&executor);
        let promise = Promise::new();
        let done = promise.future();
        executor
            .execute(move || {
                assert!(probe.in_event_loop());
                assert!(current().is_some());
                promise.try_complete();
            })
            .unwrap();
        assert!(done.wait_timeout(Duration::from_secs(2)));

        executor
            .shutdown_gracefully(Duration::ZERO, Duration::from_secs(5))
            .unwrap()
            .wait();
    }

    #[test]
    fn test_shutdown_validates_windows() {
        let executor = SingleThreadExecutor::new().unwrap();
        let result =
            executor.shutdown_gracefully(Duration::from_secs(2), Duration::from_secs(1));
        assert!(matches!(result, Err(ExecutorError::InvalidArgument(_))));
        executor
            .shutdown_gracefully(Duration::ZERO, Duration::from_secs(5))
            .unwrap()
            .wait();
    }

    #[test]
    fn test_repeat_shutdown_is_a_no_op() {
        let executor = SingleThreadExecutor::new().unwrap();
        let first = executor
            .shutdown_gracefully(Duration::ZERO, Duration::from_secs(5))
            .unwrap();
        let second = executor
            .shutdown_gracefully(Duration::ZERO, Duration::from_secs(5))
            .unwrap();
        first.wait();
        assert!(second.is_done());
        assert!(executor.is_terminated());
    }

    #[test]
    fn test_execute_after_termination_is_rejected() {
        let executor = SingleThreadExecutor::new().unwrap();
        executor
            .shutdown_gracefully(Duration::ZERO, Duration::from_secs(5))
            .unwrap()
            .wait();
        let result = executor.execute(|| {});
        assert!(matches!(result, Err(ExecutorError::Terminated)));
    }

    #[test]
    fn test_invalid_period_is_rejected_eagerly() {
        let executor = SingleThreadExecutor::new().unwrap();
        let result =
            executor.schedule_at_fixed_rate(|| {}, Duration::ZERO, Duration::ZERO);
        assert!(matches!(result, Err(ExecutorError::InvalidArgument(_))));
        executor
            .shutdown_gracefully(Duration::ZERO, Duration::from_secs(5))
            .unwrap()
            .wait();
    }

    #[test]
    fn test_zero_capacity_config_is_rejected() {
        let config = ExecutorConfig {
            queue_capacity: 0,
            ..ExecutorConfig::default()
        };
        assert!(matches!(
            SingleThreadExecutor::with_config(config),
            Err(ExecutorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_shutdown_hooks_run_once_and_panics_are_isolated() {
        let executor = SingleThreadExecutor::new().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = hits.clone();
        executor
            .add_shutdown_hook(move || {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        executor.add_shutdown_hook(|| panic!("misbehaving hook")).unwrap();
        let hits_clone = hits.clone();
        executor
            .add_shutdown_hook(move || {
                hits_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        executor
            .shutdown_gracefully(Duration::ZERO, Duration::from_secs(5))
            .unwrap()
            .wait();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
