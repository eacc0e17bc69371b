//! Dispatch table from `routine_type` to routine implementation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{Invocation, Routine, RoutineOutcome, executor};
use crate::error::PipelineError;

/// Object-safe view of a [`Routine`] with its parameter type erased.
#[async_trait]
pub trait DynRoutine: Send + Sync + fmt::Debug {
    /// Name messages use to address the routine.
    fn routine_type(&self) -> &'static str;

    /// Budget used when the message carries no override.
    fn default_timeout(&self) -> Duration;

    /// Runs the invocation through the executor.
    async fn execute(&self, invocation: &Invocation, grace: Duration) -> RoutineOutcome;
}

#[derive(Debug)]
struct Erased<R>(R);

#[async_trait]
impl<R: Routine> DynRoutine for Erased<R> {
    fn routine_type(&self) -> &'static str {
        self.0.routine_type()
    }

    fn default_timeout(&self) -> Duration {
        self.0.default_timeout()
    }

    async fn execute(&self, invocation: &Invocation, grace: Duration) -> RoutineOutcome {
        executor::execute(&self.0, invocation, grace).await
    }
}

/// Registered routines keyed by `routine_type`.
///
/// Populated at startup, then shared read-only.
#[derive(Debug, Clone, Default)]
pub struct RoutineRegistry {
    routines: HashMap<&'static str, Arc<dyn DynRoutine>>,
}

impl RoutineRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `routine` under its `routine_type`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the type is already taken.
    pub fn register<R: Routine>(&mut self, routine: R) -> Result<(), PipelineError> {
        let routine_type = routine.routine_type();
        if self.routines.contains_key(routine_type) {
            return Err(PipelineError::Config(format!(
                "routine {routine_type} registered twice"
            )));
        }
        self.routines.insert(routine_type, Arc::new(Erased(routine)));
        Ok(())
    }

    /// Looks up a routine.
    #[must_use]
    pub fn get(&self, routine_type: &str) -> Option<Arc<dyn DynRoutine>> {
        self.routines.get(routine_type).map(Arc::clone)
    }

    /// Registered routine types, sorted.
    #[must_use]
    pub fn routine_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.routines.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Number of registered routines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routines.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    /// Runs `invocation` against the routine it addresses.
    ///
    /// An unregistered type yields `Failed(UnknownRoutine)` without running
    /// anything.
    pub async fn dispatch(&self, invocation: &Invocation, grace: Duration) -> RoutineOutcome {
        match self.get(invocation.routine_type()) {
            Some(routine) => routine.execute(invocation, grace).await,
            None => RoutineOutcome::Failed(PipelineError::UnknownRoutine(
                invocation.routine_type().to_string(),
            )),
        }
    }
}
