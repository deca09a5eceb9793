use std::sync::Arc;

use uuid::Uuid;

use crate::{
    dto::{
        EpochMillis,
        poll::{ActivePollPayload, PollSnapshot},
        ws::RevealNotice,
    },
    session::{
        clock::{self, ClockOffset},
        recovery::RecoveredPoll,
        submission::SubmissionGate,
    },
};

/// Live state for the poll currently presented to the student.
///
/// Owned exclusively by the session driver; everything else sees it through
/// published [`SessionUpdate`](crate::session::SessionUpdate)s.
#[derive(Debug)]
pub(crate) struct ActivePoll {
    /// Immutable snapshot delivered at activation.
    pub snapshot: Arc<PollSnapshot>,
    /// Absolute answer deadline on the server clock.
    pub deadline: EpochMillis,
    /// Clock anchor derived from this poll's activation or recovery payload.
    pub offset: ClockOffset,
    /// One-shot answer bookkeeping.
    pub gate: SubmissionGate,
    /// Reveal that arrived before the countdown ran out.
    pub pending_reveal: Option<RevealNotice>,
}

impl ActivePoll {
    /// Build poll state from a push activation, anchoring the clock at the
    /// local receipt time.
    pub fn from_activation(payload: ActivePollPayload, local_receipt: EpochMillis) -> Self {
        let offset = ClockOffset::between(payload.server_time, local_receipt);
        Self {
            snapshot: Arc::new(payload.poll),
            deadline: payload.poll_end_time,
            offset,
            gate: SubmissionGate::new(),
            pending_reveal: None,
        }
    }

    /// Build poll state from a recovery probe, reusing its clock anchor.
    pub fn from_recovery(recovered: RecoveredPoll) -> Self {
        Self {
            snapshot: Arc::new(recovered.payload.poll),
            deadline: recovered.payload.poll_end_time,
            offset: recovered.offset,
            gate: SubmissionGate::new(),
            pending_reveal: None,
        }
    }

    /// Identifier of the tracked poll.
    pub fn id(&self) -> Uuid {
        self.snapshot.id
    }

    /// Whole seconds left before the deadline.
    pub fn remaining(&self) -> u64 {
        clock::remaining_secs(self.deadline, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(server_time: EpochMillis, poll_end_time: EpochMillis) -> ActivePollPayload {
        ActivePollPayload {
            poll: PollSnapshot {
                id: Uuid::new_v4(),
                session_id: "ABC123".into(),
                question: "Pick one".into(),
                options: vec!["a".into(), "b".into()],
                correct_answer: 0,
                justification: None,
                time_limit: 30,
            },
            poll_end_time,
            server_time,
        }
    }

    #[test]
    fn activation_anchors_clock_at_receipt_time() {
        let poll = ActivePoll::from_activation(payload(1_000_000, 1_030_000), 1_000_200);
        assert_eq!(poll.offset.millis(), -200);
        assert_eq!(poll.deadline, 1_030_000);
        assert!(poll.pending_reveal.is_none());
        assert!(!poll.gate.answered());
    }
}
