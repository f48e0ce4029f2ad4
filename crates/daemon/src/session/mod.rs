//! Upload sessions.
//!
//! One session serves one client connection: it receives whole messages,
//! stores each valid file frame and acknowledges it before reading the next.
//! Every failure ends at the session boundary as a [`SessionOutcome`]; no
//! error escapes to the acceptor or to other sessions.

pub mod handler;
pub mod registry;
pub mod state;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::files::PersistenceSink;
use crate::orchestrator::OrchestratorEvent;

pub use handler::Session;
pub use registry::{DaemonStats, SessionInfo, SessionRegistry};
pub use state::{InvalidTransition, SessionState, StateMachine};

/// Unique identifier for a session.
pub type SessionId = String;

/// Generate a fresh session identifier.
pub fn new_session_id() -> SessionId {
    Uuid::new_v4().to_string()
}

/// Default WebSocket handshake timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for sending the acknowledgment.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The client went away.
    Disconnected,
    /// A transfer was refused and the connection closed.
    Rejected(String),
    /// An unexpected transport failure.
    TransportFailed(String),
    /// The client went quiet for too long, or did not take the acknowledgment.
    TimedOut,
    /// The daemon is shutting down.
    Shutdown,
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::Disconnected => write!(f, "disconnected"),
            SessionOutcome::Rejected(reason) => write!(f, "rejected: {}", reason),
            SessionOutcome::TransportFailed(reason) => write!(f, "transport failed: {}", reason),
            SessionOutcome::TimedOut => write!(f, "timed out"),
            SessionOutcome::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Immutable configuration shared by all sessions.
pub struct SessionContext {
    pub(crate) sink: PersistenceSink,
    pub(crate) handshake_timeout: Option<Duration>,
    pub(crate) write_timeout: Option<Duration>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) events: broadcast::Sender<OrchestratorEvent>,
    pub(crate) shutdown: CancellationToken,
}

impl SessionContext {
    /// Create a context with default timeouts and a private registry.
    pub fn new(sink: PersistenceSink) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            sink,
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            write_timeout: Some(DEFAULT_WRITE_TIMEOUT),
            registry: Arc::new(SessionRegistry::new()),
            events,
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the timeouts; `None` disables a timeout.
    ///
    /// Idle reads are limited by the transport, which reports them as
    /// [`TransportError::Timeout`](crate::network::TransportError::Timeout).
    pub fn with_timeouts(mut self, handshake: Option<Duration>, write: Option<Duration>) -> Self {
        self.handshake_timeout = handshake;
        self.write_timeout = write;
        self
    }

    pub fn with_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<OrchestratorEvent>) -> Self {
        self.events = events;
        self
    }

    /// Token that ends idle sessions when cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn sink(&self) -> &PersistenceSink {
        &self.sink
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: OrchestratorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
