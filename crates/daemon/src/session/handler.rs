//! The per-connection upload loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use protocol::{FileTransferFrame, FrameHeader, ACK_MESSAGE};
use tracing::{debug, error, info, warn};

use super::state::{SessionState, StateMachine};
use super::{SessionContext, SessionId, SessionOutcome};
use crate::network::{IncomingMessage, MessageConnection, TransportError, TransportResult};
use crate::orchestrator::OrchestratorEvent;

/// Await `future`, giving up after `limit`. Returns `None` on timeout.
async fn with_timeout<T>(limit: Option<Duration>, future: impl Future<Output = T>) -> Option<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.ok(),
        None => Some(future.await),
    }
}

/// Server-side handler for one client connection.
pub struct Session {
    id: SessionId,
    connection: Box<dyn MessageConnection>,
    context: Arc<SessionContext>,
    state: StateMachine,
}

impl Session {
    /// Wrap a connection whose transport handshake is already complete.
    pub fn new<C>(id: SessionId, connection: C, context: Arc<SessionContext>) -> Self
    where
        C: MessageConnection + 'static,
    {
        Self {
            id,
            connection: Box::new(connection),
            context,
            state: StateMachine::starting_at(SessionState::Handshaking),
        }
    }

    /// Drive a transport handshake into a session.
    ///
    /// The handshake is bounded by the context's handshake timeout. A failed
    /// handshake discards the connection without retrying.
    pub async fn establish<F, C>(
        id: SessionId,
        peer: Option<SocketAddr>,
        context: Arc<SessionContext>,
        handshake: F,
    ) -> Result<Self, SessionOutcome>
    where
        F: Future<Output = TransportResult<C>>,
        C: MessageConnection + 'static,
    {
        let mut state = StateMachine::new();
        if let Err(e) = state.transition(SessionState::Handshaking) {
            error!(session_id = %id, error = %e, "Session state machine violated");
        }

        match with_timeout(context.handshake_timeout, handshake).await {
            Some(Ok(connection)) => Ok(Self {
                id,
                connection: Box::new(connection),
                context,
                state,
            }),
            Some(Err(e)) => {
                debug!(session_id = %id, ?peer, error = %e, "Handshake failed");
                Err(if e.is_disconnect() {
                    SessionOutcome::Disconnected
                } else {
                    SessionOutcome::TransportFailed(e.to_string())
                })
            }
            None => {
                debug!(session_id = %id, ?peer, "Handshake timed out");
                Err(SessionOutcome::TimedOut)
            }
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state.state()
    }

    fn advance(&mut self, next: SessionState) {
        if let Err(e) = self.state.transition(next) {
            error!(session_id = %self.id, error = %e, "Session state machine violated");
        }
    }

    /// Serve the connection until it ends. Never fails; the outcome says why it ended.
    pub async fn run(mut self) -> SessionOutcome {
        let peer = self.connection.peer_addr();
        self.advance(SessionState::AwaitingMessage);
        self.context.registry.register(&self.id, peer);
        self.context.emit(OrchestratorEvent::SessionOpened {
            session_id: self.id.clone(),
            peer,
        });
        info!(session_id = %self.id, ?peer, "Session opened");

        let outcome = self.serve().await;

        self.advance(SessionState::Closed);
        match with_timeout(self.context.write_timeout, self.connection.close()).await {
            Some(Err(e)) => debug!(session_id = %self.id, error = %e, "Error closing connection"),
            None => debug!(session_id = %self.id, "Timed out closing connection"),
            Some(Ok(())) => {}
        }

        let files_saved = self
            .context
            .registry
            .unregister(&self.id)
            .map(|info| info.files_saved)
            .unwrap_or_default();

        match &outcome {
            SessionOutcome::TransportFailed(reason) => {
                error!(session_id = %self.id, ?peer, files_saved, error = %reason, "Session failed")
            }
            SessionOutcome::Rejected(reason) => {
                warn!(session_id = %self.id, ?peer, files_saved, reason = %reason, "Session closed after rejected transfer")
            }
            other => {
                info!(session_id = %self.id, ?peer, files_saved, outcome = %other, "Session closed")
            }
        }

        self.context.emit(OrchestratorEvent::SessionClosed {
            session_id: self.id.clone(),
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn serve(&mut self) -> SessionOutcome {
        let shutdown = self.context.shutdown.clone();

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return SessionOutcome::Shutdown,
                received = self.connection.recv() => received,
            };

            let message = match received {
                Ok(Some(message)) => message,
                Ok(None) => return SessionOutcome::Disconnected,
                Err(e) if e.is_disconnect() => {
                    debug!(session_id = %self.id, error = %e, "Connection dropped");
                    return SessionOutcome::Disconnected;
                }
                Err(TransportError::Timeout(reason)) => {
                    debug!(session_id = %self.id, reason = %reason, "Client idle too long");
                    return SessionOutcome::TimedOut;
                }
                Err(e) => return SessionOutcome::TransportFailed(e.to_string()),
            };

            self.advance(SessionState::Processing);
            if let Some(outcome) = self.process(message).await {
                return outcome;
            }
            self.advance(SessionState::AwaitingMessage);
        }
    }

    /// Handle one message. Returns an outcome when the session must end.
    async fn process(&mut self, message: IncomingMessage) -> Option<SessionOutcome> {
        match message {
            IncomingMessage::Text(text) => {
                info!(session_id = %self.id, text = %text, "Received text message");
                None
            }
            IncomingMessage::Binary(data) => self.receive_file(data).await,
        }
    }

    async fn receive_file(&mut self, data: Vec<u8>) -> Option<SessionOutcome> {
        let received = data.len();
        let header = FrameHeader::peek(&data).ok();
        let frame = match FileTransferFrame::from_message(data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(session_id = %self.id, received, ?header, "Malformed frame");
                return Some(self.reject(e.to_string()));
            }
        };
        debug!(
            session_id = %self.id,
            name = %frame.file_name_lossy(),
            received,
            content_len = frame.content.len(),
            "Parsed file frame"
        );

        let context = Arc::clone(&self.context);
        let stored = match tokio::task::spawn_blocking(move || context.sink.store(&frame)).await {
            Ok(Ok(stored)) => stored,
            Ok(Err(e)) => return Some(self.reject(e.to_string())),
            Err(e) => return Some(self.reject(format!("storage task failed: {}", e))),
        };

        info!(
            session_id = %self.id,
            path = %stored.path.display(),
            bytes = stored.bytes_written,
            capture_metadata = stored.capture_metadata_applied,
            "File saved"
        );
        self.context.registry.record_file(&self.id, stored.bytes_written);
        self.context.emit(OrchestratorEvent::FileSaved {
            session_id: self.id.clone(),
            path: stored.path,
            bytes: stored.bytes_written,
        });

        match with_timeout(self.context.write_timeout, self.connection.send_text(ACK_MESSAGE)).await {
            Some(Ok(())) => None,
            Some(Err(e)) if e.is_disconnect() => Some(SessionOutcome::Disconnected),
            Some(Err(e)) => Some(SessionOutcome::TransportFailed(e.to_string())),
            None => Some(SessionOutcome::TimedOut),
        }
    }

    fn reject(&self, reason: String) -> SessionOutcome {
        warn!(session_id = %self.id, reason = %reason, "Rejected transfer");
        self.context.registry.record_rejection();
        self.context.emit(OrchestratorEvent::TransferRejected {
            session_id: self.id.clone(),
            reason: reason.clone(),
        });
        SessionOutcome::Rejected(reason)
    }
}
