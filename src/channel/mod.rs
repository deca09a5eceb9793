//! Realtime push channel between the student client and the backend.

use std::time::Duration;

mod backoff;
/// WebSocket worker driving the channel connection.
pub mod client;

pub use client::ChannelClient;

/// Connection state of the push channel as surfaced to views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A connection attempt is in progress.
    Connecting,
    /// The channel is up and delivering pushes.
    Connected,
    /// The channel is down; a reconnect is pending.
    Disconnected,
}

/// Tuning knobs for the channel worker.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// WebSocket URL of the push endpoint.
    pub url: String,
    /// Interval between heartbeat frames while connected.
    pub heartbeat_interval: Duration,
    /// Cap for the reconnect backoff schedule.
    pub max_backoff: Duration,
}
