//! Live session orchestration.
//!
//! [`start`] attaches a student to a running session: it verifies the join
//! over REST, spawns the push channel worker, and hands all resulting events
//! to a single driver task. Views observe the session through the update
//! feed and steer it through [`SessionCommand`]s on the returned handle.

use std::sync::Arc;

use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    SessionError,
    api::{ApiError, StudentBackend},
    channel::ChannelClient,
    config::ClientConfig,
    dto::{SessionCode, poll::SessionInfo},
};

/// Server-clock offset math for countdown computations.
pub mod clock;
/// Countdown task ticking toward the poll deadline.
pub mod countdown;
mod driver;
mod poll;
/// REST probe repairing poll state after reloads or missed pushes.
pub mod recovery;
/// Poll lifecycle state machine.
pub mod state_machine;
/// One-shot answer submission gate.
pub mod submission;
/// Update fan-out from the driver to subscribed views.
pub mod updates;

pub use driver::SessionCommand;
pub use updates::{SessionUpdate, UpdateHub};

use driver::{SessionDriver, SessionSignal};

/// Update backlog kept per subscriber before old entries are dropped.
const UPDATE_CAPACITY: usize = 64;

/// A student's live attachment to a running session.
///
/// Dropping the handle leaves the session as if [`SessionHandle::leave`]
/// had been called.
pub struct SessionHandle {
    info: SessionInfo,
    student_id: Uuid,
    inbox: mpsc::UnboundedSender<SessionSignal>,
    channel: ChannelClient,
    updates: Arc<UpdateHub>,
    driver: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Metadata of the joined session.
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Identifier this student joined under.
    pub fn student_id(&self) -> Uuid {
        self.student_id
    }

    /// Subscribe to the session's update feed.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Subscribe as a stream, for `select`-style consumers.
    pub fn update_stream(&self) -> BroadcastStream<SessionUpdate> {
        self.updates.stream()
    }

    /// Stage an option for the active poll.
    pub fn select_option(&self, index: usize) {
        self.command(SessionCommand::SelectOption(index));
    }

    /// Commit the staged option as this student's answer.
    pub fn submit_answer(&self) {
        self.command(SessionCommand::SubmitAnswer);
    }

    /// Tell the session the view is visible again; the countdown is
    /// recomputed immediately instead of on the next tick.
    pub fn visibility_regained(&self) {
        self.command(SessionCommand::VisibilityRegained);
    }

    /// Ask for a fresh participant count.
    pub fn refresh_participants(&self) {
        self.command(SessionCommand::RefreshParticipants);
    }

    /// Leave the session: close the channel, stop the countdown, and report
    /// the departure to the backend.
    pub fn leave(&self) {
        self.channel.leave();
        self.command(SessionCommand::Leave);
    }

    /// Wait for the driver task to finish after [`SessionHandle::leave`].
    pub async fn closed(&mut self) {
        if let Some(task) = self.driver.take() {
            let _ = task.await;
        }
    }

    fn command(&self, command: SessionCommand) {
        let _ = self.inbox.send(SessionSignal::Command(command));
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.channel.leave();
        let _ = self.inbox.send(SessionSignal::Command(SessionCommand::Leave));
    }
}

/// Join `code` as `student_id` and spin up the session machinery.
///
/// Fetching the session is the one hard prerequisite. A failed join report
/// only logs a warning, pushes and the recovery probe still reach us, but
/// rejected credentials abort the attempt.
pub async fn start(
    config: &ClientConfig,
    backend: Arc<dyn StudentBackend>,
    code: SessionCode,
    student_id: Uuid,
) -> Result<SessionHandle, SessionError> {
    let info = backend.fetch_session(&code).await.map_err(SessionError::from)?;
    info!(code = %code, title = %info.title, "joining session");

    if let Err(err) = backend.join_session(&code, student_id).await {
        match err {
            ApiError::AuthRequired | ApiError::AccessDenied => return Err(err.into()),
            err => warn!(error = %err, "join report failed, continuing on push events"),
        }
    }

    let updates = Arc::new(UpdateHub::new(UPDATE_CAPACITY));
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

    let channel = ChannelClient::spawn(
        config.channel_settings(),
        code.clone(),
        student_id,
        backend.clone(),
        inbox_tx.clone(),
    );

    // Mirror channel status changes into the driver's inbox so they are
    // ordered with every other signal.
    let mut status_rx = channel.status();
    let status_inbox = inbox_tx.clone();
    tokio::spawn(async move {
        loop {
            let status = *status_rx.borrow_and_update();
            if status_inbox
                .send(SessionSignal::ChannelStatus(status))
                .is_err()
            {
                break;
            }
            if status_rx.changed().await.is_err() {
                break;
            }
        }
    });

    let driver = SessionDriver::new(
        code,
        student_id,
        backend,
        updates.clone(),
        inbox_tx.clone(),
        countdown::DEFAULT_TICK_PERIOD,
        config.recovery_delay,
    );
    let task = tokio::spawn(driver.run(inbox_rx));

    Ok(SessionHandle {
        info,
        student_id,
        inbox: inbox_tx,
        channel,
        updates,
        driver: Some(task),
    })
}
