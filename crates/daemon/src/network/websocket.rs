//! WebSocket transport backed by tokio-tungstenite.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_io_timeout::TimeoutStream;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{accept_async_with_config, WebSocketStream};
use tracing::{debug, trace};

use super::{IncomingMessage, MessageConnection, TransportError, TransportResult};

/// A stream whose reads fail with `TimedOut` after a period without data.
pub type IdleTimeoutStream<S> = Pin<Box<TimeoutStream<S>>>;

/// Wrap `stream` so that a read waiting longer than `read_timeout` for the
/// next bytes fails. The clock restarts whenever data arrives, so a large
/// message that keeps flowing is never cut off. `None` disables the limit.
pub fn idle_timeout_stream<S>(stream: S, read_timeout: Option<Duration>) -> IdleTimeoutStream<S>
where
    S: AsyncRead + AsyncWrite,
{
    let mut stream = TimeoutStream::new(stream);
    stream.set_read_timeout(read_timeout);
    Box::pin(stream)
}

/// Sort a tungstenite error into an expected disconnect, an idle timeout or
/// a real failure.
pub fn classify_ws_error(error: WsError) -> TransportError {
    if let WsError::Io(e) = &error {
        if e.kind() == io::ErrorKind::TimedOut {
            return TransportError::Timeout(error.to_string());
        }
    }

    let disconnect = match &error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(e) => matches!(
            e.kind(),
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
        ),
        _ => false,
    };

    if disconnect {
        TransportError::Disconnected(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}

/// WebSocket settings for an upload server.
///
/// A whole file arrives as one message, so the message and frame limits are
/// both set to the largest accepted transfer.
pub fn server_config(max_message_size: usize) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(max_message_size);
    config.max_frame_size = Some(max_message_size);
    config
}

/// Server side of a WebSocket connection.
pub struct WebSocketConnection<S = TcpStream> {
    stream: WebSocketStream<S>,
    peer: Option<SocketAddr>,
    closed: bool,
}

impl<S> WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Perform the server handshake on an accepted stream.
    pub async fn accept(
        stream: S,
        peer: Option<SocketAddr>,
        max_message_size: usize,
    ) -> TransportResult<Self> {
        let stream = accept_async_with_config(stream, Some(server_config(max_message_size)))
            .await
            .map_err(classify_ws_error)?;

        debug!(?peer, "WebSocket handshake complete");
        Ok(Self::from_stream(stream, peer))
    }

    /// Wrap a stream that has already completed the handshake.
    pub fn from_stream(stream: WebSocketStream<S>, peer: Option<SocketAddr>) -> Self {
        Self {
            stream,
            peer,
            closed: false,
        }
    }

    async fn next_message(&mut self) -> TransportResult<Option<IncomingMessage>> {
        if self.closed {
            return Ok(None);
        }

        loop {
            match self.stream.next().await {
                None => {
                    self.closed = true;
                    return Ok(None);
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    return Ok(Some(IncomingMessage::Binary(data)));
                }
                Some(Ok(WsMessage::Text(text))) => {
                    return Ok(Some(IncomingMessage::Text(text)));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(peer = ?self.peer, ?frame, "Peer sent close frame");
                    self.closed = true;
                    return Ok(None);
                }
                Some(Ok(other)) => {
                    // Ping replies are queued by tungstenite and flushed on the next read.
                    trace!(peer = ?self.peer, kind = ?other, "Ignoring control frame");
                }
                Some(Err(e)) => {
                    let error = classify_ws_error(e);
                    if error.is_disconnect() {
                        self.closed = true;
                    }
                    return Err(error);
                }
            }
        }
    }

    async fn send_text_message(&mut self, text: &str) -> TransportResult<()> {
        self.stream
            .send(WsMessage::Text(text.to_string()))
            .await
            .map_err(classify_ws_error)
    }

    async fn close_stream(&mut self) -> TransportResult<()> {
        let result = self.stream.close(None).await;
        self.closed = true;

        match result.map_err(classify_ws_error) {
            Err(e) if !e.is_disconnect() => Err(e),
            _ => Ok(()),
        }
    }
}

impl<S> MessageConnection for WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn recv(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = TransportResult<Option<IncomingMessage>>> + Send + '_>> {
        Box::pin(self.next_message())
    }

    fn send_text<'a>(
        &'a mut self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + 'a>> {
        Box::pin(self.send_text_message(text))
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(self.close_stream())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}
