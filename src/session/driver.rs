//! The session driver: a single task owning all live poll state.
//!
//! Push messages, countdown ticks, view commands, and resolved backend calls
//! all funnel into one inbox and are applied in arrival order; nothing else
//! mutates poll state. Countdown signals name the poll they were timed for,
//! so a signal queued by a superseded poll's task before it was stopped is
//! recognized as stale and dropped.

use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, time};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    api::{ApiError, StudentBackend},
    channel::ConnectionStatus,
    dto::{self, SessionCode, poll::SubmissionRequest, ws::{RevealNotice, ServerPush}},
    session::{
        clock,
        countdown::{Countdown, CountdownSignal},
        poll::ActivePoll,
        recovery::{self, RecoveredPoll},
        state_machine::{PollEvent, PollPhase, PollStateMachine},
        submission::SubmissionRecord,
        updates::{SessionUpdate, UpdateHub},
    },
};

/// Commands issued by the embedding view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Stage an option for the active poll.
    SelectOption(usize),
    /// Commit the staged option.
    SubmitAnswer,
    /// The view returned to the foreground; recompute the countdown now
    /// instead of waiting for the next tick.
    VisibilityRegained,
    /// Re-fetch the participant roster.
    RefreshParticipants,
    /// Leave the session and shut the driver down.
    Leave,
}

/// Everything the driver reacts to, funneled through one inbox.
#[derive(Debug)]
pub(crate) enum SessionSignal {
    /// A parsed push message from the realtime channel.
    Push(ServerPush),
    /// A signal from the countdown task.
    Countdown(CountdownSignal),
    /// A command from the embedding view.
    Command(SessionCommand),
    /// The spawned submission request resolved.
    SubmissionResolved {
        poll_id: Uuid,
        record: SubmissionRecord,
    },
    /// The recovery probe finished.
    RecoveryFinished(Option<RecoveredPoll>),
    /// A roster fetch finished.
    ParticipantsFetched(usize),
    /// A backend call was rejected for missing or expired credentials.
    AuthFailed,
    /// The realtime channel changed connection state.
    ChannelStatus(ConnectionStatus),
}

impl From<ServerPush> for SessionSignal {
    fn from(push: ServerPush) -> Self {
        SessionSignal::Push(push)
    }
}

impl From<CountdownSignal> for SessionSignal {
    fn from(signal: CountdownSignal) -> Self {
        SessionSignal::Countdown(signal)
    }
}

pub(crate) struct SessionDriver {
    code: SessionCode,
    student_id: Uuid,
    backend: Arc<dyn StudentBackend>,
    updates: Arc<UpdateHub>,
    inbox_tx: mpsc::UnboundedSender<SessionSignal>,
    machine: PollStateMachine,
    poll: Option<ActivePoll>,
    countdown: Option<Countdown>,
    tick_period: Duration,
    recovery_delay: Duration,
    connection: ConnectionStatus,
}

impl SessionDriver {
    pub(crate) fn new(
        code: SessionCode,
        student_id: Uuid,
        backend: Arc<dyn StudentBackend>,
        updates: Arc<UpdateHub>,
        inbox_tx: mpsc::UnboundedSender<SessionSignal>,
        tick_period: Duration,
        recovery_delay: Duration,
    ) -> Self {
        Self {
            code,
            student_id,
            backend,
            updates,
            inbox_tx,
            machine: PollStateMachine::new(),
            poll: None,
            countdown: None,
            tick_period,
            recovery_delay,
            connection: ConnectionStatus::Connecting,
        }
    }

    /// Consume signals until the view leaves the session.
    pub(crate) async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<SessionSignal>) {
        while let Some(signal) = inbox.recv().await {
            match signal {
                SessionSignal::Push(push) => self.on_push(push),
                SessionSignal::Countdown(signal) => self.on_countdown(signal),
                SessionSignal::Command(SessionCommand::SelectOption(index)) => {
                    self.select_option(index)
                }
                SessionSignal::Command(SessionCommand::SubmitAnswer) => self.commit_answer(),
                SessionSignal::Command(SessionCommand::VisibilityRegained) => {
                    self.on_visibility_regained()
                }
                SessionSignal::Command(SessionCommand::RefreshParticipants) => {
                    self.spawn_participant_fetch()
                }
                SessionSignal::Command(SessionCommand::Leave) => {
                    self.shutdown().await;
                    break;
                }
                SessionSignal::SubmissionResolved { poll_id, record } => {
                    self.on_submission_resolved(poll_id, record)
                }
                SessionSignal::RecoveryFinished(found) => self.on_recovered(found),
                SessionSignal::ParticipantsFetched(count) => self
                    .updates
                    .publish(SessionUpdate::ParticipantsOnline { count }),
                SessionSignal::AuthFailed => self.updates.publish(SessionUpdate::AuthExpired),
                SessionSignal::ChannelStatus(status) => self.on_channel_status(status),
            }
        }
    }

    fn on_push(&mut self, push: ServerPush) {
        match push {
            ServerPush::PollActivated(payload) => {
                self.activate(ActivePoll::from_activation(payload, clock::local_now()));
            }
            ServerPush::PollDeactivated {
                session_id,
                poll_id,
            } => self.on_poll_deactivated(&session_id, poll_id),
            ServerPush::RevealAnswers(notice) => self.on_reveal(notice),
            ServerPush::ParticipantCountUpdated => self.spawn_participant_fetch(),
            ServerPush::HeartbeatAck | ServerPush::Unknown => {
                debug!("ignoring channel message with no session effect");
            }
        }
    }

    /// Start tracking `poll`, superseding whatever came before it.
    fn activate(&mut self, poll: ActivePoll) {
        if let Some(previous) = self.poll.take() {
            debug!(poll_id = %previous.id(), "superseding previous poll");
        }
        self.stop_countdown();

        if let Err(err) = self.machine.apply(PollEvent::Activated) {
            warn!(error = %err, "activation rejected");
            return;
        }

        let remaining = poll.remaining();
        info!(
            poll_id = %poll.id(),
            deadline = %dto::format_epoch_millis(poll.deadline),
            offset_ms = poll.offset.millis(),
            remaining,
            "poll activated"
        );

        self.countdown = Some(Countdown::start_with_period(
            poll.id(),
            poll.deadline,
            poll.offset,
            self.inbox_tx.clone(),
            self.tick_period,
        ));
        self.updates.publish(SessionUpdate::PollStarted {
            poll: poll.snapshot.clone(),
            remaining,
        });
        self.poll = Some(poll);
    }

    fn on_poll_deactivated(&mut self, session_id: &str, poll_id: Uuid) {
        let Some(poll) = self.poll.take() else {
            debug!("poll-deactivated while idle");
            return;
        };
        if poll.id() != poll_id {
            debug!(
                session = session_id,
                tracked = %poll.id(),
                cleared = %poll_id,
                "deactivation names a different poll; clearing anyway"
            );
        }
        self.stop_countdown();

        if let Err(err) = self.machine.apply(PollEvent::Deactivated) {
            warn!(error = %err, "deactivation rejected");
            return;
        }
        info!(poll_id = %poll.id(), "poll cleared");
        self.updates.publish(SessionUpdate::PollCleared);
    }

    fn on_reveal(&mut self, notice: RevealNotice) {
        if !self.code.matches(&notice.session_id) {
            debug!(session = %notice.session_id, "ignoring reveal for another session");
            return;
        }
        let Some(poll) = self.poll.as_ref() else {
            debug!("reveal received with no active poll");
            return;
        };

        // A reveal can outrun the countdown; it only takes effect once the
        // timer is at (or within a second of) zero.
        let remaining = poll.remaining();
        if remaining <= 1 {
            self.apply_reveal();
        } else {
            debug!(remaining, "buffering reveal until the countdown ends");
            if let Some(poll) = self.poll.as_mut() {
                poll.pending_reveal = Some(notice);
            }
        }
    }

    /// Transition to revealed and let subscribers show the correct answer.
    fn apply_reveal(&mut self) {
        let Some(poll) = self.poll.as_mut() else {
            return;
        };
        poll.pending_reveal = None;
        let snapshot = poll.snapshot.clone();

        match self.machine.apply(PollEvent::Reveal) {
            Ok(_) => {
                info!(poll_id = %snapshot.id, "results revealed");
                self.updates
                    .publish(SessionUpdate::ResultsRevealed { poll: snapshot });
            }
            Err(err) => debug!(error = %err, "reveal skipped"),
        }
    }

    /// Apply a countdown signal, unless it outlived its poll. Stopping a
    /// countdown cannot recall signals it already pushed into the inbox.
    fn on_countdown(&mut self, signal: CountdownSignal) {
        let tracked = self.poll.as_ref().map(ActivePoll::id);
        match signal {
            CountdownSignal::Tick { poll_id, remaining } if tracked == Some(poll_id) => {
                self.updates
                    .publish(SessionUpdate::CountdownTick { remaining });
            }
            CountdownSignal::Expired { poll_id } if tracked == Some(poll_id) => {
                self.on_deadline_reached();
            }
            stale => debug!(?stale, "dropping countdown signal for a poll no longer tracked"),
        }
    }

    /// Close input and apply any buffered reveal. Safe to hit more than once;
    /// the phase checks make the second arrival a no-op.
    fn on_deadline_reached(&mut self) {
        if self.poll.is_none() {
            return;
        }
        self.stop_countdown();

        match self.machine.apply(PollEvent::TimedOut) {
            Ok(_) => {
                if let Some(poll) = self.poll.as_ref() {
                    info!(poll_id = %poll.id(), "poll deadline reached");
                }
                self.updates.publish(SessionUpdate::TimeExpired);
            }
            Err(err) => debug!(error = %err, "deadline reached outside the active phase"),
        }

        let has_pending = self
            .poll
            .as_ref()
            .is_some_and(|poll| poll.pending_reveal.is_some());
        if has_pending {
            self.apply_reveal();
        }
    }

    /// Recompute the countdown eagerly after the view was backgrounded;
    /// throttled timers may not have fired for minutes.
    fn on_visibility_regained(&mut self) {
        let Some(poll) = self.poll.as_ref() else {
            return;
        };
        let remaining = poll.remaining();
        debug!(remaining, "visibility regained");
        if remaining == 0 {
            self.on_deadline_reached();
        } else {
            self.updates
                .publish(SessionUpdate::CountdownTick { remaining });
        }
    }

    fn select_option(&mut self, index: usize) {
        let phase = self.machine.phase();
        let Some(poll) = self.poll.as_mut() else {
            debug!("no active poll to select in");
            return;
        };
        let remaining = clock::remaining_secs(poll.deadline, poll.offset);
        let option_count = poll.snapshot.options.len();
        match poll.gate.select(index, phase, remaining, option_count) {
            Ok(()) => {
                self.updates
                    .publish(SessionUpdate::SelectionChanged { option: index });
            }
            Err(err) => debug!(error = %err, option = index, "selection rejected"),
        }
    }

    /// Kick off the one-shot submission request without blocking the inbox.
    fn commit_answer(&mut self) {
        let phase = self.machine.phase();
        let Some(poll) = self.poll.as_mut() else {
            debug!("no active poll to answer");
            return;
        };
        let remaining = poll.remaining();
        let selection = match poll.gate.begin_commit(phase, remaining) {
            Ok(selection) => selection,
            Err(err) => {
                debug!(error = %err, "commit rejected");
                return;
            }
        };

        let response_time = poll.snapshot.time_limit.saturating_sub(remaining);
        let poll_id = poll.id();
        let backend = self.backend.clone();
        let inbox = self.inbox_tx.clone();
        let student = self.student_id;
        info!(
            poll_id = %poll_id,
            option = selection,
            response_secs = response_time,
            "submitting answer"
        );

        tokio::spawn(async move {
            let request = SubmissionRequest {
                selected_option: selection,
                response_time,
            };
            let record = match backend.submit_response(student, poll_id, request).await {
                Ok(reply) => SubmissionRecord {
                    is_correct: reply.is_correct,
                    error: None,
                    response_secs: response_time,
                },
                Err(err) => {
                    warn!(poll_id = %poll_id, error = %err, "answer submission failed");
                    if matches!(err, ApiError::AuthRequired) {
                        let _ = inbox.send(SessionSignal::AuthFailed);
                    }
                    SubmissionRecord {
                        is_correct: false,
                        error: Some("Submission failed".into()),
                        response_secs: response_time,
                    }
                }
            };
            let _ = inbox.send(SessionSignal::SubmissionResolved { poll_id, record });
        });
    }

    fn on_submission_resolved(&mut self, poll_id: Uuid, record: SubmissionRecord) {
        let Some(poll) = self.poll.as_mut() else {
            debug!(poll_id = %poll_id, "submission resolved after the poll was cleared");
            return;
        };
        if poll.id() != poll_id {
            debug!(
                tracked = %poll.id(),
                resolved = %poll_id,
                "dropping submission outcome for a superseded poll"
            );
            return;
        }

        let succeeded = record.error.is_none();
        let record = match poll.gate.resolve(record) {
            Ok(record) => record.clone(),
            Err(err) => {
                warn!(error = %err, "discarding duplicate submission outcome");
                return;
            }
        };
        if succeeded {
            self.spawn_activity_ping();
        }

        if let Err(err) = self.machine.apply(PollEvent::Submitted) {
            // The countdown may have locked the poll while the request was
            // on the wire; the recorded answer still stands.
            debug!(error = %err, "submission landed outside the active phase");
        }
        self.updates.publish(SessionUpdate::AnswerRecorded { record });
    }

    fn on_recovered(&mut self, found: Option<RecoveredPoll>) {
        let Some(recovered) = found else {
            return;
        };
        if self
            .poll
            .as_ref()
            .is_some_and(|poll| poll.id() == recovered.payload.poll.id)
        {
            debug!(poll_id = %recovered.payload.poll.id, "recovered poll already tracked");
            return;
        }
        info!(
            poll_id = %recovered.payload.poll.id,
            remaining = recovered.remaining,
            "adopting recovered poll"
        );
        self.activate(ActivePoll::from_recovery(recovered));
    }

    fn on_channel_status(&mut self, status: ConnectionStatus) {
        if status == self.connection {
            return;
        }
        debug!(?status, "channel status changed");
        self.connection = status;
        // A drop keeps the current poll; only the indicator changes until
        // the channel returns and the probe reconciles what was missed.
        self.updates.publish(SessionUpdate::Connection(status));

        if status == ConnectionStatus::Connected {
            self.schedule_recovery();
            self.spawn_participant_fetch();
        }
    }

    fn schedule_recovery(&self) {
        let backend = self.backend.clone();
        let code = self.code.clone();
        let inbox = self.inbox_tx.clone();
        let delay = self.recovery_delay;
        tokio::spawn(async move {
            // Push messages get a head start; the probe only repairs what
            // they missed.
            time::sleep(delay).await;
            match recovery::probe_active_poll(&backend, &code).await {
                Ok(found) => {
                    let _ = inbox.send(SessionSignal::RecoveryFinished(found));
                }
                Err(err) => {
                    warn!(error = %err, "recovery probe rejected");
                    let _ = inbox.send(SessionSignal::AuthFailed);
                }
            }
        });
    }

    fn spawn_participant_fetch(&self) {
        let backend = self.backend.clone();
        let code = self.code.clone();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            match backend.fetch_participants(&code).await {
                Ok(participants) => {
                    let count = participants.iter().filter(|p| p.is_active).count();
                    let _ = inbox.send(SessionSignal::ParticipantsFetched(count));
                }
                Err(ApiError::AuthRequired) => {
                    let _ = inbox.send(SessionSignal::AuthFailed);
                }
                Err(err) => warn!(error = %err, "participant fetch failed"),
            }
        });
    }

    fn spawn_activity_ping(&self) {
        let backend = self.backend.clone();
        let code = self.code.clone();
        let student = self.student_id;
        tokio::spawn(async move {
            if let Err(err) = backend.update_activity(&code, student).await {
                debug!(error = %err, "activity ping failed");
            }
        });
    }

    fn stop_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.cancel();
        }
    }

    async fn shutdown(&mut self) {
        self.stop_countdown();
        if let Err(err) = self.backend.leave_session(&self.code, self.student_id).await {
            warn!(error = %err, "failed to report session leave");
        }
        info!(code = %self.code, "left session");
    }
}
