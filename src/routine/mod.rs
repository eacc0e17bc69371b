//! Task routine abstraction.
//!
//! A routine is a named unit of distributed work. Queue messages address it
//! by its `routine_type`; the worker runtime decodes the message into an
//! [`Invocation`], looks the routine up in the [`RoutineRegistry`] and runs
//! it through the [`executor`], which owns the timeout policy.
//!
//! ```text
//! Received ─► Validating ─► Running ─┬─► Completed(status)
//!                 │                  ├─► TimedOut(status)    handler resolved within grace
//!                 └─► Failed         ├─► Failed(error)
//!                                    └─► Fatal(error)        handler exceeded grace
//! ```
//!
//! Routines report a [`RoutineStatus`], never a payload: their effects are
//! messages dispatched to other queues and records written to the stream.

pub mod executor;
pub mod invocation;
pub mod registry;
pub mod state;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use executor::execute;
pub use invocation::{Invocation, InvocationRequest};
pub use registry::{DynRoutine, RoutineRegistry};
pub use state::InvocationState;

use crate::error::PipelineError;

/// Status code a routine reports when it finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutineStatus {
    /// Every unit of work succeeded.
    Success,
    /// Some items were skipped (e.g. decoding failures) but the rest
    /// completed.
    PartialSuccess,
    /// The input resolved to no work.
    NothingToDo,
    /// The routine gave up on the input without error. Used by timeout
    /// handlers that accept losing the remainder.
    Abandoned,
}

impl fmt::Display for RoutineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::PartialSuccess => "partial_success",
            Self::NothingToDo => "nothing_to_do",
            Self::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of one invocation. Exactly one is produced per
/// invocation.
#[derive(Debug)]
pub enum RoutineOutcome {
    /// The body finished within its budget.
    Completed(RoutineStatus),
    /// The budget expired and the timeout handler resolved within the grace
    /// period.
    TimedOut {
        /// Time spent in the body before the deadline fired.
        elapsed: Duration,
        /// Status reported by the timeout handler.
        status: RoutineStatus,
    },
    /// Validation, the body, or the timeout handler returned an error.
    Failed(PipelineError),
    /// The timeout handler did not finish within the grace period.
    Fatal(PipelineError),
}

impl RoutineOutcome {
    /// Returns the terminal state this outcome corresponds to.
    #[must_use]
    pub const fn state(&self) -> InvocationState {
        match self {
            Self::Completed(_) => InvocationState::Completed,
            Self::TimedOut { .. } => InvocationState::TimedOut,
            Self::Failed(_) => InvocationState::Failed,
            Self::Fatal(_) => InvocationState::Fatal,
        }
    }

    /// Returns the error carried by a failed or fatal outcome.
    #[must_use]
    pub const fn error(&self) -> Option<&PipelineError> {
        match self {
            Self::Failed(err) | Self::Fatal(err) => Some(err),
            Self::Completed(_) | Self::TimedOut { .. } => None,
        }
    }
}

/// Capability interface implemented by every routine.
///
/// `run` executes under the invocation's deadline and is cancelled (its
/// future dropped) when the deadline fires. `on_timeout` then runs under
/// the executor's fixed grace budget and decides the outcome.
#[async_trait]
pub trait Routine: Send + Sync + fmt::Debug + 'static {
    /// Typed parameters decoded from the message `params` object.
    type Params: DeserializeOwned + Send + Sync + fmt::Debug;

    /// Name messages use to address this routine.
    fn routine_type(&self) -> &'static str;

    /// Time budget used when the message carries no `timeout_seconds`.
    fn default_timeout(&self) -> Duration;

    /// Checks decoded parameters beyond what their type enforces.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason.
    fn validate(&self, _params: &Self::Params) -> Result<(), String> {
        Ok(())
    }

    /// Executes the routine body.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] when the invocation must be retried or
    /// dropped.
    async fn run(&self, params: &Self::Params) -> Result<RoutineStatus, PipelineError>;

    /// Handles an expired budget after the body was interrupted.
    ///
    /// # Errors
    ///
    /// Returning an error turns the outcome into
    /// [`RoutineOutcome::Failed`], so the message is redelivered.
    async fn on_timeout(
        &self,
        params: &Self::Params,
        elapsed: Duration,
    ) -> Result<RoutineStatus, PipelineError>;
}
