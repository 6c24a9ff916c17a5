//! Promises, completion futures, and fan-in combinators.
//!
//! A [`Promise`] resolves exactly once to success, failure, or cancellation;
//! [`CompletionFuture`] is its cloneable read side. [`PromiseCombiner`] and
//! [`PromiseAggregator`] aggregate many completions into one.

mod combiner;
mod completion;

pub use combiner::{PromiseAggregator, PromiseCombiner};
pub use completion::{Cause, CompletionFuture, FutureState, Promise};
