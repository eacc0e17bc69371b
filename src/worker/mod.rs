//! Worker runtime: poll queues, execute invocations, apply dispositions.
//!
//! | Outcome                              | Disposition                       |
//! |--------------------------------------|-----------------------------------|
//! | `Completed`, `TimedOut`              | delete                            |
//! | malformed body, `ParamsInvalid`      | delete (drop) and notify          |
//! | `Failed(UnknownRoutine)`             | dead-letter                       |
//! | other `Failed`, `Fatal`              | release, dead-letter after N tries|
//!
//! A follow-up dispatch to a routine with no queue (`UnboundRoutine`) is an
//! ordinary retryable failure.

pub mod runtime;
pub mod stats;

use std::time::Duration;

pub use runtime::WorkerRuntime;
pub use stats::{StatsSnapshot, WorkerStats};

use crate::error::PipelineError;
use crate::routine::RoutineOutcome;
use crate::stream::RetryPolicy;

/// Tuning knobs of the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Queues polled round-robin.
    pub queues: Vec<String>,
    /// Maximum invocations running at once.
    pub concurrency: usize,
    /// Sleep after a full round of empty receives.
    pub poll_interval: Duration,
    /// Stop after receiving this many messages (batch and test runs).
    pub max_messages: Option<u64>,
    /// Receives after which a failing message is dead-lettered.
    pub max_receive_count: u32,
    /// How long a received message stays hidden.
    pub visibility_timeout: Duration,
    /// Budget for timeout handlers.
    pub timeout_grace: Duration,
    /// Delay before a released message becomes visible again, by attempt.
    pub release_backoff: RetryPolicy,
    /// Messages requested per receive call.
    pub receive_batch: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            concurrency: 8,
            poll_interval: Duration::from_millis(500),
            max_messages: None,
            max_receive_count: 5,
            visibility_timeout: Duration::from_secs(900),
            timeout_grace: Duration::from_secs(10),
            release_backoff: RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(60)),
            receive_batch: 10,
        }
    }
}

/// What happens to a message after its invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove from the queue.
    Delete,
    /// Can never succeed; remove from the queue.
    Drop,
    /// Make visible again after a delay.
    Release,
    /// Move to the dead-letter queue.
    DeadLetter,
}

impl Disposition {
    /// Decides the disposition of a message delivered `receive_count`
    /// times.
    #[must_use]
    pub const fn for_outcome(
        outcome: &RoutineOutcome,
        receive_count: u32,
        max_receive_count: u32,
    ) -> Self {
        match outcome {
            RoutineOutcome::Completed(_) | RoutineOutcome::TimedOut { .. } => Self::Delete,
            RoutineOutcome::Failed(PipelineError::UnknownRoutine(_)) => Self::DeadLetter,
            RoutineOutcome::Failed(err) | RoutineOutcome::Fatal(err) => {
                if !err.is_retryable() {
                    Self::Drop
                } else if receive_count >= max_receive_count {
                    Self::DeadLetter
                } else {
                    Self::Release
                }
            }
        }
    }
}
