//! The answer submission gate: at most one committed answer per poll.

use thiserror::Error;

use crate::session::state_machine::PollPhase;

/// Outcome of the one-shot answer submission, kept for the poll's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    /// Whether the backend judged the selected option correct.
    ///
    /// `false` when the request failed; the answer stays locked regardless.
    pub is_correct: bool,
    /// Set when the submission request itself failed.
    pub error: Option<String>,
    /// Seconds between activation and the commit, as reported to the backend.
    pub response_secs: u64,
}

/// Rejections raised by the gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// Input is only accepted while the poll is active.
    #[error("answers are closed for this poll")]
    InputClosed,
    /// An answer was already recorded for this poll.
    #[error("an answer was already submitted")]
    AlreadySubmitted,
    /// A submission request is still on the wire.
    #[error("a submission is already in progress")]
    CommitInProgress,
    /// Commit was requested with nothing selected.
    #[error("no option selected")]
    NoSelection,
    /// The countdown has reached zero.
    #[error("the poll deadline has passed")]
    DeadlinePassed,
    /// The selected index does not exist in this poll.
    #[error("option index {0} is out of range")]
    UnknownOption(usize),
}

/// Tracks the staged selection and the single commit for the active poll.
///
/// The gate never talks to the network itself; the session driver performs
/// the request and feeds the outcome back through [`SubmissionGate::resolve`].
#[derive(Debug, Default)]
pub struct SubmissionGate {
    selected: Option<usize>,
    record: Option<SubmissionRecord>,
    in_flight: bool,
}

impl SubmissionGate {
    /// A gate with nothing selected and nothing committed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently staged option, if any.
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// The committed outcome, once the request resolved.
    pub fn record(&self) -> Option<&SubmissionRecord> {
        self.record.as_ref()
    }

    /// Whether a commit is currently awaiting its response.
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Whether the student already answered (or the answer is on the wire).
    pub fn answered(&self) -> bool {
        self.record.is_some() || self.in_flight
    }

    /// Stage `index` as the chosen option.
    ///
    /// Allowed only while the poll is active, the deadline has not passed,
    /// and no commit has started.
    pub fn select(
        &mut self,
        index: usize,
        phase: PollPhase,
        remaining: u64,
        option_count: usize,
    ) -> Result<(), GateError> {
        if self.record.is_some() {
            return Err(GateError::AlreadySubmitted);
        }
        if self.in_flight {
            return Err(GateError::CommitInProgress);
        }
        if phase != PollPhase::Active {
            return Err(GateError::InputClosed);
        }
        if remaining == 0 {
            return Err(GateError::DeadlinePassed);
        }
        if index >= option_count {
            return Err(GateError::UnknownOption(index));
        }
        self.selected = Some(index);
        Ok(())
    }

    /// Open the one-shot commit, returning the selection to send.
    ///
    /// Marks the gate busy so a second commit is rejected until
    /// [`SubmissionGate::resolve`] is called.
    pub fn begin_commit(&mut self, phase: PollPhase, remaining: u64) -> Result<usize, GateError> {
        if self.record.is_some() {
            return Err(GateError::AlreadySubmitted);
        }
        if self.in_flight {
            return Err(GateError::CommitInProgress);
        }
        if phase != PollPhase::Active {
            return Err(GateError::InputClosed);
        }
        if remaining == 0 {
            return Err(GateError::DeadlinePassed);
        }
        let selection = self.selected.ok_or(GateError::NoSelection)?;
        self.in_flight = true;
        Ok(selection)
    }

    /// Store the resolved outcome. The record is written exactly once.
    pub fn resolve(&mut self, record: SubmissionRecord) -> Result<&SubmissionRecord, GateError> {
        if self.record.is_some() {
            return Err(GateError::AlreadySubmitted);
        }
        self.in_flight = false;
        Ok(self.record.insert(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(is_correct: bool) -> SubmissionRecord {
        SubmissionRecord {
            is_correct,
            error: None,
            response_secs: 7,
        }
    }

    #[test]
    fn select_then_commit_then_resolve() {
        let mut gate = SubmissionGate::new();
        gate.select(1, PollPhase::Active, 20, 4).unwrap();
        assert_eq!(gate.selected(), Some(1));

        let selection = gate.begin_commit(PollPhase::Active, 19).unwrap();
        assert_eq!(selection, 1);
        assert!(gate.in_flight());
        assert!(gate.answered());

        gate.resolve(outcome(true)).unwrap();
        assert!(!gate.in_flight());
        assert!(gate.record().unwrap().is_correct);
    }

    #[test]
    fn at_most_one_commit_per_poll() {
        let mut gate = SubmissionGate::new();
        gate.select(0, PollPhase::Active, 20, 2).unwrap();
        gate.begin_commit(PollPhase::Active, 20).unwrap();

        // While the first commit is on the wire.
        assert_eq!(
            gate.begin_commit(PollPhase::Active, 19),
            Err(GateError::CommitInProgress)
        );

        gate.resolve(outcome(false)).unwrap();

        // After the outcome landed, even a failed one.
        assert_eq!(
            gate.begin_commit(PollPhase::Active, 18),
            Err(GateError::AlreadySubmitted)
        );
        assert_eq!(gate.resolve(outcome(true)), Err(GateError::AlreadySubmitted));
    }

    #[test]
    fn selection_is_frozen_once_committed() {
        let mut gate = SubmissionGate::new();
        gate.select(0, PollPhase::Active, 20, 2).unwrap();
        gate.begin_commit(PollPhase::Active, 20).unwrap();
        assert_eq!(
            gate.select(1, PollPhase::Active, 19, 2),
            Err(GateError::CommitInProgress)
        );

        gate.resolve(outcome(true)).unwrap();
        assert_eq!(
            gate.select(1, PollPhase::Active, 18, 2),
            Err(GateError::AlreadySubmitted)
        );
        assert_eq!(gate.selected(), Some(0));
    }

    #[test]
    fn input_is_rejected_outside_the_active_phase() {
        let mut gate = SubmissionGate::new();
        assert_eq!(
            gate.select(0, PollPhase::Idle, 20, 2),
            Err(GateError::InputClosed)
        );
        assert_eq!(
            gate.select(0, PollPhase::Locked, 20, 2),
            Err(GateError::InputClosed)
        );
        assert_eq!(
            gate.begin_commit(PollPhase::Revealed, 20),
            Err(GateError::InputClosed)
        );
    }

    #[test]
    fn expired_countdown_blocks_selection_and_commit() {
        let mut gate = SubmissionGate::new();
        assert_eq!(
            gate.select(0, PollPhase::Active, 0, 2),
            Err(GateError::DeadlinePassed)
        );

        gate.select(0, PollPhase::Active, 1, 2).unwrap();
        assert_eq!(
            gate.begin_commit(PollPhase::Active, 0),
            Err(GateError::DeadlinePassed)
        );
    }

    #[test]
    fn commit_requires_a_staged_selection() {
        let mut gate = SubmissionGate::new();
        assert_eq!(
            gate.begin_commit(PollPhase::Active, 10),
            Err(GateError::NoSelection)
        );
    }

    #[test]
    fn out_of_range_options_are_rejected() {
        let mut gate = SubmissionGate::new();
        assert_eq!(
            gate.select(4, PollPhase::Active, 10, 4),
            Err(GateError::UnknownOption(4))
        );
    }
}
