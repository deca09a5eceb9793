use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    channel::ConnectionStatus,
    dto::poll::PollSnapshot,
    session::submission::SubmissionRecord,
};

/// State changes mirrored from the session driver to its subscribers.
///
/// Updates are a one-way feed: views render them but never mutate session
/// state directly, they issue commands instead.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// Connection status of the realtime channel changed.
    Connection(ConnectionStatus),
    /// A poll went live; the countdown starts from `remaining` seconds.
    PollStarted {
        /// Snapshot of the activated poll.
        poll: Arc<PollSnapshot>,
        /// Whole seconds left at activation.
        remaining: u64,
    },
    /// Periodic countdown refresh.
    CountdownTick {
        /// Whole seconds left.
        remaining: u64,
    },
    /// The staged selection changed.
    SelectionChanged {
        /// Zero-based index of the staged option.
        option: usize,
    },
    /// The answer commit resolved, successfully or with an error note.
    AnswerRecorded {
        /// The recorded outcome.
        record: SubmissionRecord,
    },
    /// The countdown reached zero before any submission.
    TimeExpired,
    /// Results are now visible.
    ResultsRevealed {
        /// The poll whose answer may now be shown.
        poll: Arc<PollSnapshot>,
    },
    /// The poll was cleared; back to waiting for the next one.
    PollCleared,
    /// Refreshed count of participants currently online.
    ParticipantsOnline {
        /// Number of active participants.
        count: usize,
    },
    /// The backend rejected our credentials; the student must sign in again.
    AuthExpired,
}

/// Broadcast hub fanning session updates out to every subscribed view.
pub struct UpdateHub {
    sender: broadcast::Sender<SessionUpdate>,
}

impl UpdateHub {
    /// Construct a hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent updates.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.sender.subscribe()
    }

    /// Subscribe as a stream, for `select`-style consumers.
    pub fn stream(&self) -> BroadcastStream<SessionUpdate> {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Send an update to all current subscribers, ignoring delivery errors.
    pub fn publish(&self, update: SessionUpdate) {
        let _ = self.sender.send(update);
    }
}
