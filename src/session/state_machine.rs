use thiserror::Error;

/// Lifecycle phase of the poll currently shown to the student.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollPhase {
    /// No poll is live; the student is waiting.
    #[default]
    Idle,
    /// A poll is running and answers are accepted.
    Active,
    /// Input is closed (answered or timed out) but results stay hidden.
    Locked,
    /// The correct answer and justification are visible.
    Revealed,
}

/// Events that drive the poll lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    /// A poll went live.
    Activated,
    /// The student's answer was committed, successfully or not.
    Submitted,
    /// The countdown reached zero before a submission.
    TimedOut,
    /// The reveal condition was satisfied.
    Reveal,
    /// The teacher cleared the poll.
    Deactivated,
}

/// Error returned when an event cannot be applied to the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// Phase the machine was in when the event arrived.
    pub from: PollPhase,
    /// Event that could not be applied.
    pub event: PollEvent,
}

/// State machine for the student-side poll lifecycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollStateMachine {
    phase: PollPhase,
}

impl PollStateMachine {
    /// Create a machine in the [`PollPhase::Idle`] phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> PollPhase {
        self.phase
    }

    /// Apply `event`, returning the phase entered.
    pub fn apply(&mut self, event: PollEvent) -> Result<PollPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            // An activation replaces whatever poll came before it, so it is
            // accepted from every phase.
            (_, PollEvent::Activated) => PollPhase::Active,
            // Deactivation is idempotent: clearing an idle session is a no-op.
            (_, PollEvent::Deactivated) => PollPhase::Idle,
            (PollPhase::Active, PollEvent::Submitted) => PollPhase::Locked,
            (PollPhase::Active, PollEvent::TimedOut) => PollPhase::Locked,
            // A reveal can strike while input is still open during the final
            // second of the countdown.
            (PollPhase::Active, PollEvent::Reveal) => PollPhase::Revealed,
            (PollPhase::Locked, PollEvent::Reveal) => PollPhase::Revealed,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        self.phase = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(machine: &mut PollStateMachine, event: PollEvent) -> PollPhase {
        machine.apply(event).unwrap()
    }

    #[test]
    fn initial_phase_is_idle() {
        assert_eq!(PollStateMachine::new().phase(), PollPhase::Idle);
    }

    #[test]
    fn answered_poll_runs_through_locked_to_revealed() {
        let mut machine = PollStateMachine::new();
        assert_eq!(apply(&mut machine, PollEvent::Activated), PollPhase::Active);
        assert_eq!(apply(&mut machine, PollEvent::Submitted), PollPhase::Locked);
        assert_eq!(apply(&mut machine, PollEvent::Reveal), PollPhase::Revealed);
        assert_eq!(apply(&mut machine, PollEvent::Deactivated), PollPhase::Idle);
    }

    #[test]
    fn unanswered_poll_locks_on_timeout() {
        let mut machine = PollStateMachine::new();
        apply(&mut machine, PollEvent::Activated);
        assert_eq!(apply(&mut machine, PollEvent::TimedOut), PollPhase::Locked);
    }

    #[test]
    fn reveal_is_accepted_while_still_active() {
        let mut machine = PollStateMachine::new();
        apply(&mut machine, PollEvent::Activated);
        assert_eq!(apply(&mut machine, PollEvent::Reveal), PollPhase::Revealed);
    }

    #[test]
    fn new_activation_supersedes_running_poll() {
        let mut machine = PollStateMachine::new();
        apply(&mut machine, PollEvent::Activated);
        apply(&mut machine, PollEvent::Submitted);
        assert_eq!(apply(&mut machine, PollEvent::Activated), PollPhase::Active);

        apply(&mut machine, PollEvent::Reveal);
        assert_eq!(apply(&mut machine, PollEvent::Activated), PollPhase::Active);
    }

    #[test]
    fn deactivation_is_idempotent() {
        let mut machine = PollStateMachine::new();
        assert_eq!(apply(&mut machine, PollEvent::Deactivated), PollPhase::Idle);
        assert_eq!(apply(&mut machine, PollEvent::Deactivated), PollPhase::Idle);

        apply(&mut machine, PollEvent::Activated);
        assert_eq!(apply(&mut machine, PollEvent::Deactivated), PollPhase::Idle);
    }

    #[test]
    fn invalid_transition_returns_error() {
        let mut machine = PollStateMachine::new();
        let err = machine.apply(PollEvent::Submitted).unwrap_err();
        assert_eq!(err.from, PollPhase::Idle);
        assert_eq!(err.event, PollEvent::Submitted);
        assert_eq!(machine.phase(), PollPhase::Idle);

        apply(&mut machine, PollEvent::Activated);
        apply(&mut machine, PollEvent::TimedOut);
        assert!(machine.apply(PollEvent::Submitted).is_err());
        assert!(machine.apply(PollEvent::TimedOut).is_err());

        apply(&mut machine, PollEvent::Reveal);
        assert!(machine.apply(PollEvent::Reveal).is_err());
    }
}
