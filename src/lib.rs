#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # Strand
//!
//! Single-threaded event-loop executors with ordered task execution,
//! deadline scheduling, and promise-based completion tracking.
//!
//! Each [`SingleThreadExecutor`] owns one OS thread, a bounded FIFO of
//! immediate tasks, and a deadline-ordered schedule queue. Tasks submitted
//! from any thread run serially on the loop in arrival order, so state
//! confined to one executor needs no further synchronization. An
//! [`ExecutorGroup`] pools several executors behind a pluggable selection
//! policy.
//!
//! ## Modules
//!
//! - [`executor`]: the event loop, its configuration, groups, queues, and
//!   overload policies
//! - [`promise`]: single-assignment completion cells, futures, and fan-in
//!   combinators
//! - [`task`]: the unit of work and its panic isolation
//! - [`error`]: error taxonomy
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use strand::SingleThreadExecutor;
//!
//! # fn main() -> Result<(), strand::ExecutorError> {
//! let executor = SingleThreadExecutor::new()?;
//! executor.execute(|| println!("runs on the loop thread"))?;
//!
//! let handle = executor.schedule(|| println!("runs later"), Duration::from_millis(10))?;
//! handle.completion().wait();
//!
//! executor
//!     .shutdown_gracefully(Duration::from_secs(2), Duration::from_secs(15))?
//!     .wait();
//! # Ok(())
//! # }
//! ```

/// Error taxonomy for executors and promises
pub mod error;

/// Event-loop executors, groups, queues, and rejection policies
pub mod executor;

/// Single-assignment completion cells and fan-in combinators
pub mod promise;

/// Units of work and panic isolation
pub mod task;

// Re-export key types for easier access
pub use error::{ExecutorError, PromiseError};
pub use executor::group::{Chooser, ExecutorGroup, PowerOfTwoChooser, RoundRobinChooser};
pub use executor::rejection::{ExponentialBackoff, FixedBackoff, Reject, RejectionHandler};
pub use executor::single_thread::{current, ScheduledHandle, SingleThreadExecutor};
pub use executor::{DefaultThreadFactory, ExecutorConfig, ExecutorState, ThreadFactory};
pub use promise::{
    Cause, CompletionFuture, FutureState, Promise, PromiseAggregator, PromiseCombiner,
};
pub use task::{Task, TaskPanic};
