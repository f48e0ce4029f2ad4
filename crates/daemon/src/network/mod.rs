//! Network module for client connections.
//!
//! Clients connect over plain WebSocket and send one binary message per file.
//! This module provides:
//! - [`MessageConnection`]: the message-level view of a connection used by sessions
//! - [`WebSocketConnection`]: the tokio-tungstenite implementation
//! - [`Acceptor`]: the listener that turns accepted sockets into sessions

pub mod acceptor;
pub mod websocket;

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use thiserror::Error;

/// One complete message received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingMessage {
    /// A binary payload; expected to carry a file transfer frame.
    Binary(Vec<u8>),
    /// A text payload; diagnostic only.
    Text(String),
}

/// Errors surfaced by a connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The peer went away. An expected way for a session to end.
    #[error("peer disconnected: {0}")]
    Disconnected(String),

    /// An operation did not complete in time, or the peer went quiet.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Returns true if this error is a normal end of the connection.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::Disconnected(_))
    }
}

/// Result type for connection operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// A message-oriented client connection.
///
/// Implementations deliver whole messages; fragmentation and control frames
/// are handled below this trait.
pub trait MessageConnection: Send {
    /// Waits for the next complete message.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly.
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<Option<IncomingMessage>>> + Send + '_>>;

    /// Sends a text message.
    fn send_text<'a>(
        &'a mut self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + 'a>>;

    /// Closes the connection. Closing an already closed connection succeeds.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>>;

    /// Returns the remote address, if known.
    fn peer_addr(&self) -> Option<SocketAddr>;
}

pub use acceptor::{Acceptor, AcceptorConfig};
pub use websocket::{classify_ws_error, idle_timeout_stream, IdleTimeoutStream, WebSocketConnection};
