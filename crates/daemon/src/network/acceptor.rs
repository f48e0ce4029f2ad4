//! Connection acceptor.
//!
//! Accepts TCP connections and runs each one as an independent session task.
//! A slow or failing session never blocks the accept loop or other sessions.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn, Instrument};

use super::websocket::{idle_timeout_stream, WebSocketConnection};
use crate::config::{ConfigError, ServerConfig};
use crate::session::{new_session_id, Session, SessionContext, SessionOutcome};

/// Pause after a failed `accept` so a persistent error does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Listener settings.
#[derive(Debug, Clone)]
pub struct AcceptorConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// Largest accepted WebSocket message.
    pub max_message_size: usize,
    /// Maximum concurrent sessions; 0 means unlimited.
    pub max_connections: usize,
    /// Longest a connection may go without sending any bytes.
    pub read_timeout: Option<Duration>,
}

impl AcceptorConfig {
    pub fn from_server_config(server: &ServerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: server.socket_addr()?,
            max_message_size: server.max_message_bytes(),
            max_connections: server.max_connections,
            read_timeout: server.read_timeout(),
        })
    }
}

/// Accepts client connections and spawns a session for each.
pub struct Acceptor {
    listener: TcpListener,
    config: AcceptorConfig,
    context: Arc<SessionContext>,
    limiter: Option<Arc<Semaphore>>,
}

impl Acceptor {
    /// Bind the listening socket.
    pub async fn bind(config: AcceptorConfig, context: Arc<SessionContext>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await.map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("failed to bind {}: {}", config.bind_addr, e),
            )
        })?;

        let limiter = (config.max_connections > 0)
            .then(|| Arc::new(Semaphore::new(config.max_connections)));

        info!(
            addr = %listener.local_addr()?,
            max_connections = config.max_connections,
            "Acceptor bound"
        );

        Ok(Self {
            listener,
            config,
            context,
            limiter,
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` is cancelled, then wait for
    /// running sessions to finish.
    pub async fn run(self, shutdown: CancellationToken) {
        let tracker = TaskTracker::new();

        loop {
            let permit = match self.acquire_permit(&shutdown).await {
                Some(permit) => permit,
                None => break,
            };

            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let context = Arc::clone(&self.context);
                    tracker.spawn(handle_connection(
                        stream,
                        peer,
                        context,
                        self.config.clone(),
                        permit,
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        tracker.close();
        info!(sessions = tracker.len(), "Acceptor stopped, waiting for sessions");
        tracker.wait().await;
        debug!("All sessions finished");
    }

    /// Wait for a free connection slot.
    ///
    /// Returns `None` on shutdown and `Some(None)` when connections are not capped.
    async fn acquire_permit(
        &self,
        shutdown: &CancellationToken,
    ) -> Option<Option<OwnedSemaphorePermit>> {
        let Some(limiter) = &self.limiter else {
            return Some(None);
        };

        if limiter.available_permits() == 0 {
            debug!("Connection limit reached, waiting for a free slot");
        }

        tokio::select! {
            _ = shutdown.cancelled() => None,
            permit = Arc::clone(limiter).acquire_owned() => permit.ok().map(Some),
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    context: Arc<SessionContext>,
    config: AcceptorConfig,
    permit: Option<OwnedSemaphorePermit>,
) {
    let id = new_session_id();
    let span = tracing::info_span!("session", session_id = %id, %peer);

    async move {
        let _permit = permit;
        debug!("Accepted connection");

        let stream = idle_timeout_stream(stream, config.read_timeout);
        let handshake = WebSocketConnection::accept(stream, Some(peer), config.max_message_size);
        let session = match Session::establish(id, Some(peer), context, handshake).await {
            Ok(session) => session,
            Err(SessionOutcome::TransportFailed(reason)) => {
                warn!(error = %reason, "WebSocket handshake failed");
                return;
            }
            Err(outcome) => {
                debug!(%outcome, "Connection ended during handshake");
                return;
            }
        };

        let outcome = session.run().await;
        debug!(%outcome, "Session task finished");
    }
    .instrument(span)
    .await
}
