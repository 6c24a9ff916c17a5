//! Error types for the strand executors.
//!
//! Errors are split by subsystem: [`ExecutorError`] covers task admission and
//! executor lifecycle, [`PromiseError`] covers invalid completion-cell
//! transitions. Racy code should prefer the non-erroring `try_*` promise
//! operations over the erroring ones.

use std::io;
use thiserror::Error;

/// Convenience result alias for executor operations.
pub type Result<T, E = ExecutorError> = std::result::Result<T, E>;

/// Error raised by task admission and executor lifecycle operations.
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// The bounded task queue is full and the rejection policy gave up
    #[error("task rejected: executor queue is full")]
    RejectedExecution,

    /// The executor has terminated and accepts no further tasks
    #[error("executor is terminated")]
    Terminated,

    /// A configuration or call argument failed eager validation
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The worker thread could not be spawned
    #[error("failed to spawn executor thread: {0}")]
    ThreadSpawn(#[from] io::Error),
}

/// Error raised by erroring promise transitions and sealed combinators.
#[derive(Error, Debug)]
pub enum PromiseError {
    /// A terminal transition was attempted on an already-terminal promise
    #[error("promise is already complete")]
    AlreadyComplete,

    /// A registration was attempted on a combiner that was already sealed
    #[error("combiner is sealed: no further futures may be added")]
    CombinerSealed,
}
