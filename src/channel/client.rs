//! WebSocket worker attaching a session to the backend push channel.
//!
//! The worker owns the socket for its whole life: it joins the session on
//! connect, heartbeats on a fixed interval, forwards parsed pushes to the
//! session driver, and reconnects with backoff when the connection drops.
//! Poll state never lives here; a reconnect only changes the status light.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    api::{ConnectionReport, StudentBackend},
    channel::{ChannelSettings, ConnectionStatus, backoff},
    dto::{
        SessionCode,
        ws::{ServerPush, StudentMessage},
    },
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Instructions for the channel worker.
#[derive(Debug)]
enum ChannelCommand {
    /// Close the socket and stop reconnecting.
    Leave,
}

/// How a connected socket ended.
enum SocketEnd {
    /// The view left the session; do not reconnect.
    Leave,
    /// The connection dropped; reconnect after a delay.
    Lost,
}

#[derive(Debug, Error)]
enum SendError {
    #[error("failed to encode channel message")]
    Encode(#[from] serde_json::Error),
    #[error("failed to send channel message")]
    Transport(#[from] tungstenite::Error),
}

/// Handle to the channel worker task.
///
/// Dropping the handle aborts the worker outright; [`ChannelClient::leave`]
/// ends it gracefully with a close frame and an offline report.
pub struct ChannelClient {
    commands: mpsc::UnboundedSender<ChannelCommand>,
    status: watch::Receiver<ConnectionStatus>,
    task: JoinHandle<()>,
}

impl ChannelClient {
    /// Spawn a worker that keeps `code`'s push channel alive and forwards
    /// every parsed push into `events`.
    pub(crate) fn spawn<T>(
        settings: ChannelSettings,
        code: SessionCode,
        student_id: Uuid,
        backend: Arc<dyn StudentBackend>,
        events: mpsc::UnboundedSender<T>,
    ) -> Self
    where
        T: From<ServerPush> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let worker = ChannelWorker {
            settings,
            code,
            student_id,
            backend,
            events,
            commands: command_rx,
            status: status_tx,
        };
        let task = tokio::spawn(worker.run());
        Self {
            commands: command_tx,
            status: status_rx,
            task,
        }
    }

    /// Watch receiver carrying the current connection status.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Ask the worker to close the channel and stop reconnecting.
    pub fn leave(&self) {
        let _ = self.commands.send(ChannelCommand::Leave);
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct ChannelWorker<T> {
    settings: ChannelSettings,
    code: SessionCode,
    student_id: Uuid,
    backend: Arc<dyn StudentBackend>,
    events: mpsc::UnboundedSender<T>,
    commands: mpsc::UnboundedReceiver<ChannelCommand>,
    status: watch::Sender<ConnectionStatus>,
}

impl<T> ChannelWorker<T>
where
    T: From<ServerPush> + Send + 'static,
{
    async fn run(mut self) {
        let mut attempt: u32 = 0;
        loop {
            self.set_status(ConnectionStatus::Connecting);

            let url = self.settings.url.clone();
            let connected = tokio::select! {
                connected = connect_async(url.as_str()) => connected,
                _ = self.commands.recv() => {
                    debug!("channel worker stopped before connecting");
                    return;
                }
            };
            let mut stream = match connected {
                Ok((stream, _response)) => stream,
                Err(err) => {
                    warn!(url = %self.settings.url, error = %err, "channel connect failed");
                    self.set_status(ConnectionStatus::Disconnected);
                    if self.wait_before_retry(attempt).await.is_none() {
                        return;
                    }
                    attempt += 1;
                    continue;
                }
            };

            if let Err(err) = self.send_join(&mut stream).await {
                warn!(error = %err, "failed to announce the join over the channel");
                self.set_status(ConnectionStatus::Disconnected);
                if self.wait_before_retry(attempt).await.is_none() {
                    return;
                }
                attempt += 1;
                continue;
            }

            info!(url = %self.settings.url, code = %self.code, "channel connected");
            attempt = 0;
            self.set_status(ConnectionStatus::Connected);
            self.report_connection(ConnectionReport::Online);

            match self.drive(&mut stream).await {
                SocketEnd::Leave => {
                    let _ = stream.send(Message::Close(None)).await;
                    self.report_connection(ConnectionReport::Offline);
                    info!("channel closed");
                    return;
                }
                SocketEnd::Lost => {
                    self.set_status(ConnectionStatus::Disconnected);
                    self.report_connection(ConnectionReport::Offline);
                    if self.wait_before_retry(attempt).await.is_none() {
                        return;
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Pump one connected socket until it drops or the session leaves.
    async fn drive(&mut self, stream: &mut WsStream) -> SocketEnd {
        let mut heartbeat = time::interval_at(
            time::Instant::now() + self.settings.heartbeat_interval,
            self.settings.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                incoming = stream.next() => {
                    let Some(frame) = incoming else {
                        warn!("channel stream ended");
                        return SocketEnd::Lost;
                    };
                    match frame {
                        Ok(message) => {
                            if let Some(end) = self.dispatch(stream, message).await {
                                return end;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "channel read failed");
                            return SocketEnd::Lost;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(err) = self.send_heartbeat(stream).await {
                        warn!(error = %err, "heartbeat failed");
                        return SocketEnd::Lost;
                    }
                    self.report_activity();
                }
                // Only `Leave` exists; a closed command channel means the
                // session handle is gone, which amounts to the same thing.
                _ = self.commands.recv() => {
                    debug!("leave requested");
                    return SocketEnd::Leave;
                }
            }
        }
    }

    async fn dispatch(&mut self, stream: &mut WsStream, message: Message) -> Option<SocketEnd> {
        match message {
            Message::Text(text) => {
                match ServerPush::from_json_str(text.as_str()) {
                    Ok(push) => {
                        if self.events.send(push.into()).is_err() {
                            // The driver is gone; no point keeping the socket.
                            return Some(SocketEnd::Leave);
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "discarding malformed channel message");
                    }
                }
                None
            }
            Message::Ping(payload) => {
                if let Err(err) = stream.send(Message::Pong(payload)).await {
                    warn!(error = %err, "pong failed");
                    return Some(SocketEnd::Lost);
                }
                None
            }
            Message::Close(frame) => {
                info!(?frame, "channel closed by the server");
                Some(SocketEnd::Lost)
            }
            Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => None,
        }
    }

    async fn send_join(&self, stream: &mut WsStream) -> Result<(), SendError> {
        let message = StudentMessage::JoinSession {
            session_id: self.code.as_str().to_string(),
            student_id: self.student_id,
        };
        self.send_message(stream, &message).await
    }

    async fn send_heartbeat(&self, stream: &mut WsStream) -> Result<(), SendError> {
        let message = StudentMessage::Heartbeat {
            session_id: self.code.as_str().to_string(),
            student_id: self.student_id,
        };
        self.send_message(stream, &message).await
    }

    async fn send_message(
        &self,
        stream: &mut WsStream,
        message: &StudentMessage,
    ) -> Result<(), SendError> {
        let json = serde_json::to_string(message)?;
        stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Refresh the student's last-activity stamp alongside each heartbeat.
    /// Fire-and-forget: liveness reporting must never stall the socket.
    fn report_activity(&self) {
        let backend = self.backend.clone();
        let code = self.code.clone();
        let student = self.student_id;
        tokio::spawn(async move {
            if let Err(err) = backend.update_activity(&code, student).await {
                debug!(error = %err, "activity report failed");
            }
        });
    }

    /// Tell the REST side whether this student is reachable over the channel.
    fn report_connection(&self, report: ConnectionReport) {
        let backend = self.backend.clone();
        let code = self.code.clone();
        let student = self.student_id;
        tokio::spawn(async move {
            if let Err(err) = backend.update_connection(&code, student, report).await {
                debug!(error = %err, "connection report failed");
            }
        });
    }

    /// Sleep out the backoff delay; `None` means the session left meanwhile.
    async fn wait_before_retry(&mut self, attempt: u32) -> Option<()> {
        let delay = backoff::reconnect_delay(attempt, self.settings.max_backoff);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "waiting before reconnect");
        tokio::select! {
            _ = time::sleep(delay) => Some(()),
            _ = self.commands.recv() => {
                debug!("leave requested during backoff");
                None
            }
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }
}
