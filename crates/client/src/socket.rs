// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Socket abstraction for the sync connection.
//!
//! Provides a trait-based socket layer that enables:
//! - Real WebSocket connections for production
//! - Mock sockets for deterministic failure-injection testing

use std::future::Future;
use std::pin::Pin;

use ripple_core::{ClientMessage, ServerMessage};

/// Error type for socket operations.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// No open connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for socket operations.
pub type SocketResult<T> = Result<T, SocketError>;

/// An event produced by reading from the socket.
#[derive(Debug)]
pub enum SocketEvent {
    /// A protocol frame arrived.
    Message(ServerMessage),
    /// The peer closed the connection; `reason` is the close reason it gave
    /// (or a synthetic one when the stream simply ended).
    Closed { reason: String },
}

/// Socket trait for the persistent sync connection.
///
/// This is the client's only extension point for I/O: tests drive a mock
/// implementation instead of a real network socket.
pub trait Socket: Send {
    /// Open a connection to the sync endpoint.
    fn connect(&mut self, url: &str)
        -> Pin<Box<dyn Future<Output = SocketResult<()>> + Send + '_>>;

    /// Close the connection, if open.
    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = SocketResult<()>> + Send + '_>>;

    /// Send a frame on the open connection.
    fn send(
        &mut self,
        msg: ClientMessage,
    ) -> Pin<Box<dyn Future<Output = SocketResult<()>> + Send + '_>>;

    /// Wait for the next inbound event.
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = SocketResult<SocketEvent>> + Send + '_>>;

    /// Check if a connection is open.
    fn is_connected(&self) -> bool;
}

/// WebSocket implementation using tokio-tungstenite.
pub struct WebSocketSocket {
    /// The WebSocket connection, if connected.
    ws: Option<WebSocketConnection>,
}

/// Internal WebSocket connection wrapper.
struct WebSocketConnection {
    sink: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        tokio_tungstenite::tungstenite::Message,
    >,
    stream: futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    >,
}

impl WebSocketSocket {
    /// Create a new, unconnected WebSocket socket.
    pub fn new() -> Self {
        WebSocketSocket { ws: None }
    }
}

impl Default for WebSocketSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Socket for WebSocketSocket {
    fn connect(
        &mut self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = SocketResult<()>> + Send + '_>> {
        let url = url.to_string();
        Box::pin(async move {
            use futures_util::StreamExt;

            let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
                .await
                .map_err(|e| SocketError::ConnectionFailed(e.to_string()))?;

            let (sink, stream) = ws_stream.split();
            self.ws = Some(WebSocketConnection { sink, stream });
            Ok(())
        })
    }

    fn disconnect(&mut self) -> Pin<Box<dyn Future<Output = SocketResult<()>> + Send + '_>> {
        Box::pin(async move {
            if let Some(mut ws) = self.ws.take() {
                use futures_util::SinkExt;
                let _ = ws.sink.close().await;
            }
            Ok(())
        })
    }

    fn send(
        &mut self,
        msg: ClientMessage,
    ) -> Pin<Box<dyn Future<Output = SocketResult<()>> + Send + '_>> {
        Box::pin(async move {
            use futures_util::SinkExt;
            use tokio_tungstenite::tungstenite::Message;

            let ws = self.ws.as_mut().ok_or(SocketError::ConnectionClosed)?;

            let json = msg
                .to_json()
                .map_err(|e| SocketError::SerializationError(e.to_string()))?;

            if let Err(e) = ws.sink.send(Message::Text(json.into())).await {
                // Connection is broken, clear it
                self.ws = None;
                return Err(SocketError::SendFailed(e.to_string()));
            }

            // Flush so connection failures are detected on send, not later
            if let Err(e) = ws.sink.flush().await {
                self.ws = None;
                return Err(SocketError::SendFailed(e.to_string()));
            }

            Ok(())
        })
    }

    fn recv(&mut self) -> Pin<Box<dyn Future<Output = SocketResult<SocketEvent>> + Send + '_>> {
        Box::pin(async move {
            use futures_util::StreamExt;
            use tokio_tungstenite::tungstenite::Message;

            let ws = self.ws.as_mut().ok_or(SocketError::ConnectionClosed)?;

            loop {
                match ws.stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        let msg = ServerMessage::from_json(&text)
                            .map_err(|e| SocketError::SerializationError(e.to_string()))?;
                        return Ok(SocketEvent::Message(msg));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        self.ws = None;
                        let reason = frame
                            .map(|f| {
                                if f.reason.is_empty() {
                                    f.code.to_string()
                                } else {
                                    f.reason.to_string()
                                }
                            })
                            .unwrap_or_else(|| "closed".to_string());
                        return Ok(SocketEvent::Closed { reason });
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // Transport-level liveness, handled by tungstenite
                        continue;
                    }
                    Some(Ok(_)) => {
                        // Ignore binary and other frame kinds
                        continue;
                    }
                    Some(Err(e)) => {
                        self.ws = None;
                        return Err(SocketError::ReceiveFailed(e.to_string()));
                    }
                    None => {
                        self.ws = None;
                        return Ok(SocketEvent::Closed { reason: "connection ended".to_string() });
                    }
                }
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.ws.is_some()
    }
}

#[cfg(test)]
#[path = "socket_tests.rs"]
pub(crate) mod tests;
