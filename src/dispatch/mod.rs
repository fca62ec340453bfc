//! Concurrent, retrying synthesis of a chunk list.
//!
//! The [`Dispatcher`] fans chunks out to a bounded pool of executors and
//! fans their [`JobOutcome`]s back in through a [`ResultCollector`], which
//! restores chunk order regardless of completion order.

pub mod collector;
pub mod dispatcher;
pub mod outcome;
pub mod retry;

pub use collector::{collect, Applied, CollectError, CollectedOutcomes, ResultCollector};
pub use dispatcher::{CancelPolicy, Dispatcher, ProgressEvent};
pub use outcome::{FailureReason, JobOutcome, JobStatus};
pub use retry::{Backoff, RetryPolicy};
