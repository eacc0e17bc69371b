//! Invocation lifecycle states.

use std::fmt;

use uuid::Uuid;

/// Lifecycle state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvocationState {
    /// Message decoded, nothing checked yet.
    Received,
    /// Parameters being decoded and validated.
    Validating,
    /// Body running under its deadline.
    Running,
    /// Body finished.
    Completed,
    /// Deadline fired and the timeout handler resolved.
    TimedOut,
    /// Validation, body, or handler error.
    Failed,
    /// Timeout handler exceeded its grace period.
    Fatal,
}

impl InvocationState {
    /// Returns `true` for the four terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::TimedOut | Self::Failed | Self::Fatal
        )
    }

    /// Returns `true` if the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Validating | Self::Failed)
                | (Self::Validating, Self::Running | Self::Failed)
                | (
                    Self::Running,
                    Self::Completed | Self::TimedOut | Self::Failed | Self::Fatal
                )
        )
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Validating => "validating",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Failed => "failed",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Tracks and logs the state of one invocation.
#[derive(Debug)]
pub(crate) struct InvocationTracker {
    invocation_id: Uuid,
    routine_type: &'static str,
    state: InvocationState,
}

impl InvocationTracker {
    pub(crate) const fn new(invocation_id: Uuid, routine_type: &'static str) -> Self {
        Self {
            invocation_id,
            routine_type,
            state: InvocationState::Received,
        }
    }

    pub(crate) const fn state(&self) -> InvocationState {
        self.state
    }

    /// Moves to `next`. Illegal transitions are logged and ignored.
    pub(crate) fn advance(&mut self, next: InvocationState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                invocation_id = %self.invocation_id,
                routine_type = self.routine_type,
                from = %self.state,
                to = %next,
                "illegal invocation state transition"
            );
            return;
        }
        tracing::debug!(
            invocation_id = %self.invocation_id,
            routine_type = self.routine_type,
            from = %self.state,
            to = %next,
            "invocation state changed"
        );
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        assert!(InvocationState::Received.can_transition_to(InvocationState::Validating));
        assert!(InvocationState::Validating.can_transition_to(InvocationState::Running));
        assert!(InvocationState::Running.can_transition_to(InvocationState::Completed));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [
            InvocationState::Completed,
            InvocationState::TimedOut,
            InvocationState::Failed,
            InvocationState::Fatal,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(InvocationState::Running));
            assert!(!terminal.can_transition_to(InvocationState::Failed));
        }
    }

    #[test]
    fn cannot_skip_validation() {
        assert!(!InvocationState::Received.can_transition_to(InvocationState::Running));
        assert!(!InvocationState::Validating.can_transition_to(InvocationState::TimedOut));
    }

    #[test]
    fn tracker_ignores_illegal_transition() {
        let mut tracker = InvocationTracker::new(Uuid::new_v4(), "test");
        tracker.advance(InvocationState::Completed);
        assert_eq!(tracker.state(), InvocationState::Received);
        tracker.advance(InvocationState::Validating);
        assert_eq!(tracker.state(), InvocationState::Validating);
    }
}
