// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection ownership and reconnect state machine.
//!
//! The transport owns the one socket and moves through:
//!
//! ```text
//! disconnected → connecting          : attempt (immediate first, then backoff)
//! connecting   → ready               : on open
//! connecting   → disconnected        : on error; failure count grows
//! ready        → disconnected        : on close/error; backoff resets only
//!                                      if the connection lived > stable_for
//! ready        → paused              : pause()
//! paused       → ready               : resume() flushes buffered frames
//! any          → stopping → terminal : stop()
//! ```
//!
//! Pausing buffers outbound frames locally; it exists so an auth rotation
//! can be spliced into the stream without racing other traffic.

use std::collections::VecDeque;
use std::time::Duration;

use ripple_core::ClientMessage;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::socket::{Socket, SocketEvent};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// No connection; a reconnect attempt is (or will be) scheduled.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected; frames flow.
    Ready,
    /// Connected, but outbound frames are buffered until `resume`.
    Paused,
    /// `stop()` was called; the socket is shutting down.
    Stopping,
    /// Fully stopped; the transport will never reconnect.
    Terminal,
}

impl SocketState {
    /// Short label for status reporting.
    pub fn as_str(&self) -> &'static str {
        match self {
            SocketState::Disconnected => "disconnected",
            SocketState::Connecting => "connecting",
            SocketState::Ready => "ready",
            SocketState::Paused => "paused",
            SocketState::Stopping => "stopping",
            SocketState::Terminal => "terminal",
        }
    }
}

/// Metadata handed to the reconnect hook on every successful (re)open.
#[derive(Debug, Clone)]
pub struct ReconnectInfo {
    /// 1 on the first connection, incremented on every reopen.
    pub connection_count: u32,
    /// Close reason of the previous connection, or `"InitialConnect"`.
    pub last_close_reason: String,
}

/// An event observed while reading from the transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A protocol frame arrived.
    Message(ripple_core::ServerMessage),
    /// The connection dropped; reconnect is up to the owner's schedule.
    Disconnected { reason: String },
}

/// Tuning knobs for the reconnect schedule.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Initial delay for exponential backoff.
    pub initial_delay: Duration,
    /// Cap on the backoff delay.
    pub max_delay: Duration,
    /// A connection that lived at least this long counts as healthy, and
    /// its loss restarts the backoff schedule from zero.
    pub stable_for: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            stable_for: Duration::from_secs(10),
        }
    }
}

/// Owns the socket and its lifecycle.
pub struct Transport<S: Socket> {
    socket: S,
    state: SocketState,
    backoff: Backoff,
    stable_for: Duration,
    /// Outbound frames held while paused, flushed in order on resume.
    buffer: VecDeque<ClientMessage>,
    connection_count: u32,
    last_close_reason: String,
    connected_at: Option<Instant>,
}

impl<S: Socket> Transport<S> {
    /// Create a transport around an unconnected socket.
    pub fn new(socket: S, config: TransportConfig) -> Self {
        Transport {
            socket,
            state: SocketState::Disconnected,
            backoff: Backoff::new(config.initial_delay, config.max_delay),
            stable_for: config.stable_for,
            buffer: VecDeque::new(),
            connection_count: 0,
            last_close_reason: "InitialConnect".to_string(),
            connected_at: None,
        }
    }

    /// Current lifecycle state.
    pub fn socket_state(&self) -> SocketState {
        self.state
    }

    /// True while frames can be read from the socket.
    pub fn is_receiving(&self) -> bool {
        matches!(self.state, SocketState::Ready | SocketState::Paused)
    }

    /// True once `stop()` has completed; the transport never reconnects.
    pub fn is_terminal(&self) -> bool {
        self.state == SocketState::Terminal
    }

    /// Reconnect metadata for the open hook and `Connect` frame.
    pub fn reconnect_info(&self) -> ReconnectInfo {
        ReconnectInfo {
            connection_count: self.connection_count,
            last_close_reason: self.last_close_reason.clone(),
        }
    }

    /// Delay to wait before the next connect attempt.
    pub fn next_attempt_delay(&mut self) -> Duration {
        self.backoff.next_delay()
    }

    /// Make one connection attempt. Returns true on success; the caller
    /// runs its open hook before sending anything.
    pub async fn connect(&mut self, url: &str) -> bool {
        if !matches!(self.state, SocketState::Disconnected) {
            return false;
        }
        self.state = SocketState::Connecting;

        match self.socket.connect(url).await {
            Ok(()) => {
                self.state = SocketState::Ready;
                self.connection_count += 1;
                self.connected_at = Some(Instant::now());
                debug!(connection_count = self.connection_count, "socket open");
                true
            }
            Err(e) => {
                debug!(error = %e, failures = self.backoff.failures(), "connect attempt failed");
                self.state = SocketState::Disconnected;
                false
            }
        }
    }

    /// Hand a frame to the socket.
    ///
    /// Returns true iff the frame was handed to an open socket (buffered
    /// frames count: the socket is open, delivery is merely deferred).
    pub async fn send_message(&mut self, msg: ClientMessage) -> bool {
        match self.state {
            SocketState::Ready => match self.socket.send(msg).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "send failed, dropping connection");
                    self.note_disconnected(format!("send failed: {}", e));
                    false
                }
            },
            SocketState::Paused => {
                self.buffer.push_back(msg);
                true
            }
            SocketState::Disconnected
            | SocketState::Connecting
            | SocketState::Stopping
            | SocketState::Terminal => false,
        }
    }

    /// Suspend sends; outbound frames are buffered until `resume`.
    pub fn pause(&mut self) {
        if self.state == SocketState::Ready {
            self.state = SocketState::Paused;
        }
    }

    /// Flush buffered frames in order and return to `Ready`.
    pub async fn resume(&mut self) {
        if self.state != SocketState::Paused {
            return;
        }
        self.state = SocketState::Ready;
        while let Some(msg) = self.buffer.pop_front() {
            if let Err(e) = self.socket.send(msg).await {
                warn!(error = %e, "send failed during resume, dropping connection");
                self.note_disconnected(format!("send failed: {}", e));
                return;
            }
        }
    }

    /// Wait for the next inbound event. Only call while `is_receiving()`.
    pub async fn recv(&mut self) -> TransportEvent {
        match self.socket.recv().await {
            Ok(SocketEvent::Message(msg)) => TransportEvent::Message(msg),
            Ok(SocketEvent::Closed { reason }) => {
                self.note_disconnected(reason.clone());
                TransportEvent::Disconnected { reason }
            }
            Err(e) => {
                let reason = e.to_string();
                self.note_disconnected(reason.clone());
                TransportEvent::Disconnected { reason }
            }
        }
    }

    /// Close the socket and refuse any further reconnects.
    pub async fn stop(&mut self) {
        if self.state == SocketState::Terminal {
            return;
        }
        self.state = SocketState::Stopping;
        self.buffer.clear();
        let _ = self.socket.disconnect().await;
        self.state = SocketState::Terminal;
    }

    /// Record a connection loss: remember the close reason, decide whether
    /// the connection was stable enough to restart the backoff schedule.
    fn note_disconnected(&mut self, reason: String) {
        if matches!(self.state, SocketState::Stopping | SocketState::Terminal) {
            return;
        }
        if let Some(connected_at) = self.connected_at.take() {
            if connected_at.elapsed() >= self.stable_for {
                self.backoff.reset();
            }
        }
        self.last_close_reason = reason;
        self.buffer.clear();
        self.state = SocketState::Disconnected;
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
