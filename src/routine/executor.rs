//! Runs one invocation under its deadline.
//!
//! The body is interrupted by dropping its future when the budget expires;
//! every suspension point inside it is a cancellation point. The timeout
//! handler then gets a fixed grace budget, and overrunning it is reported
//! as [`RoutineOutcome::Fatal`].

use std::time::Duration;

use tokio::time::Instant;

use super::state::InvocationTracker;
use super::{Invocation, InvocationState, Routine, RoutineOutcome};
use crate::error::PipelineError;

/// Returns the budget for `invocation`: the message override when present,
/// otherwise the routine default.
#[must_use]
pub fn budget_for<R: Routine>(routine: &R, invocation: &Invocation) -> Duration {
    invocation
        .request
        .timeout_seconds
        .map_or_else(|| routine.default_timeout(), Duration::from_secs)
}

/// Decodes, validates and runs `invocation` against `routine`.
///
/// Always produces exactly one terminal outcome; errors are folded into
/// [`RoutineOutcome::Failed`] or [`RoutineOutcome::Fatal`].
pub async fn execute<R: Routine>(
    routine: &R,
    invocation: &Invocation,
    grace: Duration,
) -> RoutineOutcome {
    let routine_type = routine.routine_type();
    let mut tracker = InvocationTracker::new(invocation.id, routine_type);

    tracker.advance(InvocationState::Validating);
    let params = match serde_json::from_value::<R::Params>(invocation.request.params.clone()) {
        Ok(params) => params,
        Err(e) => {
            tracker.advance(InvocationState::Failed);
            return RoutineOutcome::Failed(PipelineError::params_invalid(
                routine_type,
                e.to_string(),
            ));
        }
    };
    if let Err(reason) = routine.validate(&params) {
        tracker.advance(InvocationState::Failed);
        return RoutineOutcome::Failed(PipelineError::params_invalid(routine_type, reason));
    }

    let budget = budget_for(routine, invocation);
    tracker.advance(InvocationState::Running);
    let started = Instant::now();

    let outcome = match tokio::time::timeout(budget, routine.run(&params)).await {
        Ok(Ok(status)) => RoutineOutcome::Completed(status),
        Ok(Err(err)) => RoutineOutcome::Failed(err),
        Err(_) => {
            let elapsed = started.elapsed();
            tracing::warn!(
                invocation_id = %invocation.id,
                routine_type,
                budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                "routine deadline expired, running timeout handler"
            );
            match tokio::time::timeout(grace, routine.on_timeout(&params, elapsed)).await {
                Ok(Ok(status)) => RoutineOutcome::TimedOut { elapsed, status },
                Ok(Err(err)) => RoutineOutcome::Failed(err),
                Err(_) => RoutineOutcome::Fatal(PipelineError::Fatal(format!(
                    "timeout handler of {routine_type} exceeded its {} ms grace period",
                    grace.as_millis()
                ))),
            }
        }
    };

    tracker.advance(outcome.state());
    outcome
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::routine::{InvocationRequest, RoutineStatus};
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Deserialize)]
    struct SleepParams {
        sleep_ms: u64,
    }

    /// Sleeps for `sleep_ms`; its timeout handler sleeps for `handler_ms`.
    #[derive(Debug)]
    struct Sleeper {
        budget: Duration,
        handler_ms: u64,
        handler_fails: bool,
        finished: AtomicBool,
    }

    impl Sleeper {
        fn new(budget_ms: u64, handler_ms: u64) -> Self {
            Self {
                budget: Duration::from_millis(budget_ms),
                handler_ms,
                handler_fails: false,
                finished: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Routine for Sleeper {
        type Params = SleepParams;

        fn routine_type(&self) -> &'static str {
            "sleeper"
        }

        fn default_timeout(&self) -> Duration {
            self.budget
        }

        fn validate(&self, params: &SleepParams) -> Result<(), String> {
            if params.sleep_ms > 60_000 {
                return Err("sleep_ms too large".to_string());
            }
            Ok(())
        }

        async fn run(&self, params: &SleepParams) -> Result<RoutineStatus, PipelineError> {
            tokio::time::sleep(Duration::from_millis(params.sleep_ms)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(RoutineStatus::Success)
        }

        async fn on_timeout(
            &self,
            _params: &SleepParams,
            _elapsed: Duration,
        ) -> Result<RoutineStatus, PipelineError> {
            tokio::time::sleep(Duration::from_millis(self.handler_ms)).await;
            if self.handler_fails {
                return Err(PipelineError::Timeout {
                    routine_type: "sleeper".to_string(),
                    elapsed_ms: 0,
                });
            }
            Ok(RoutineStatus::Abandoned)
        }
    }

    fn invocation(params: serde_json::Value) -> Invocation {
        Invocation::new(InvocationRequest::new("sleeper", params), 1)
    }

    const GRACE: Duration = Duration::from_millis(100);

    #[tokio::test]
    async fn completes_within_budget() {
        let routine = Sleeper::new(1_000, 0);
        let outcome = execute(&routine, &invocation(json!({"sleep_ms": 1})), GRACE).await;
        assert!(matches!(outcome, RoutineOutcome::Completed(RoutineStatus::Success)));
    }

    #[tokio::test]
    async fn decode_failure_skips_body() {
        let routine = Sleeper::new(1_000, 0);
        let outcome = execute(&routine, &invocation(json!({"sleep": 1})), GRACE).await;
        let RoutineOutcome::Failed(err) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(err.kind(), "params_invalid");
        assert!(!routine.finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn validation_failure_skips_body() {
        let routine = Sleeper::new(1_000, 0);
        let outcome = execute(&routine, &invocation(json!({"sleep_ms": 70_000})), GRACE).await;
        assert!(matches!(
            outcome,
            RoutineOutcome::Failed(PipelineError::ParamsInvalid { .. })
        ));
        assert!(!routine.finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn expired_budget_runs_handler() {
        let routine = Sleeper::new(20, 0);
        let outcome = execute(&routine, &invocation(json!({"sleep_ms": 5_000})), GRACE).await;
        let RoutineOutcome::TimedOut { elapsed, status } = outcome else {
            panic!("expected timeout");
        };
        assert_eq!(status, RoutineStatus::Abandoned);
        assert!(elapsed >= Duration::from_millis(20));
        assert!(!routine.finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn handler_error_is_failure() {
        let mut routine = Sleeper::new(20, 0);
        routine.handler_fails = true;
        let outcome = execute(&routine, &invocation(json!({"sleep_ms": 5_000})), GRACE).await;
        assert!(matches!(
            outcome,
            RoutineOutcome::Failed(PipelineError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn slow_handler_is_fatal() {
        let routine = Sleeper::new(20, 5_000);
        let outcome = execute(&routine, &invocation(json!({"sleep_ms": 5_000})), GRACE).await;
        assert_eq!(outcome.state(), InvocationState::Fatal);
        assert!(matches!(outcome.error(), Some(PipelineError::Fatal(_))));
    }

    #[tokio::test]
    async fn message_override_replaces_default_budget() {
        let routine = Sleeper::new(10, 0);
        let request =
            InvocationRequest::new("sleeper", json!({"sleep_ms": 50})).with_timeout_seconds(5);
        let invocation = Invocation::new(request, 1);
        assert_eq!(budget_for(&routine, &invocation), Duration::from_secs(5));
        let outcome = execute(&routine, &invocation, GRACE).await;
        assert!(matches!(outcome, RoutineOutcome::Completed(_)));
    }
}
