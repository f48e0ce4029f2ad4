//! Daemon orchestrator for wiring together all components.
//!
//! This module provides the `DaemonOrchestrator` that builds the persistence
//! sink and session context from configuration, binds the acceptor and
//! coordinates graceful shutdown.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::files::{PersistenceSink, UniqueNameResolver};
use crate::network::{Acceptor, AcceptorConfig};
use crate::platform::{MetadataApplier, NoopMetadata};
use crate::session::{
    DaemonStats, SessionContext, SessionId, SessionInfo, SessionOutcome, SessionRegistry,
};

/// Daemon orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Initial state, not started.
    Stopped,
    /// Starting up, binding the listener.
    Starting,
    /// Running and accepting connections.
    Running,
    /// Shutting down gracefully.
    ShuttingDown,
}

/// Events emitted by the orchestrator.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// Orchestrator state changed.
    StateChanged(OrchestratorState),
    /// A client finished its handshake.
    SessionOpened {
        session_id: SessionId,
        peer: Option<SocketAddr>,
    },
    /// A session ended.
    SessionClosed {
        session_id: SessionId,
        outcome: SessionOutcome,
    },
    /// A file was written to the save directory.
    FileSaved {
        session_id: SessionId,
        path: PathBuf,
        bytes: u64,
    },
    /// A transfer was refused.
    TransferRejected {
        session_id: SessionId,
        reason: String,
    },
}

/// Daemon orchestrator that manages all subsystems.
pub struct DaemonOrchestrator {
    /// Configuration.
    config: Config,
    /// Directory receiving uploads.
    save_dir: PathBuf,
    /// Metadata collaborator used when metadata is enabled.
    metadata: Arc<dyn MetadataApplier>,
    /// Current state.
    state: Arc<RwLock<OrchestratorState>>,
    /// Live sessions and counters.
    registry: Arc<SessionRegistry>,
    /// Address the acceptor is bound to while running.
    local_addr: Option<SocketAddr>,
    /// The accept loop task.
    acceptor_task: Option<JoinHandle<()>>,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
    /// Event sender.
    event_tx: broadcast::Sender<OrchestratorEvent>,
}

impl DaemonOrchestrator {
    /// Creates a new daemon orchestrator.
    ///
    /// The configuration is expected to be validated by the caller; port 0
    /// is accepted here and binds an ephemeral port.
    pub fn new(
        config: Config,
        save_dir: PathBuf,
        metadata: Arc<dyn MetadataApplier>,
    ) -> Result<Self> {
        if !save_dir.is_dir() {
            anyhow::bail!("Save directory does not exist: {}", save_dir.display());
        }

        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            config,
            save_dir,
            metadata,
            state: Arc::new(RwLock::new(OrchestratorState::Stopped)),
            registry: Arc::new(SessionRegistry::new()),
            local_addr: None,
            acceptor_task: None,
            shutdown_token: CancellationToken::new(),
            event_tx,
        })
    }

    /// Returns the current state.
    pub async fn state(&self) -> OrchestratorState {
        *self.state.read().await
    }

    /// Returns a receiver for orchestrator events.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.event_tx.subscribe()
    }

    /// Returns the bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Returns the directory uploads are stored in.
    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    /// Returns a snapshot of the transfer counters.
    pub fn stats(&self) -> DaemonStats {
        self.registry.stats()
    }

    /// Lists the live sessions.
    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        self.registry.list()
    }

    /// Returns the shutdown token for external tasks to observe shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    async fn set_state(&self, next: OrchestratorState) {
        *self.state.write().await = next;
        self.emit_event(OrchestratorEvent::StateChanged(next));
    }

    /// Starts the daemon orchestrator.
    ///
    /// Fails if already running or if the listener cannot be bound.
    pub async fn start(&mut self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != OrchestratorState::Stopped {
                anyhow::bail!("Orchestrator is already running");
            }
            *state = OrchestratorState::Starting;
        }
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::Starting));

        info!("Starting daemon orchestrator...");

        let (acceptor, local_addr) = match self.prepare_acceptor().await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.set_state(OrchestratorState::Stopped).await;
                return Err(e);
            }
        };
        self.local_addr = Some(local_addr);

        let shutdown_token = self.shutdown_token.clone();
        self.acceptor_task = Some(tokio::spawn(acceptor.run(shutdown_token)));

        self.set_state(OrchestratorState::Running).await;
        info!(
            addr = %local_addr,
            save_dir = %self.save_dir.display(),
            "Daemon orchestrator started successfully"
        );
        Ok(())
    }

    /// Bind the listener and read back its address.
    async fn prepare_acceptor(&self) -> Result<(Acceptor, SocketAddr)> {
        let acceptor = self.build_acceptor().await?;
        let local_addr = acceptor
            .local_addr()
            .context("Failed to read bound address")?;
        Ok((acceptor, local_addr))
    }

    async fn build_acceptor(&self) -> Result<Acceptor> {
        let metadata: Arc<dyn MetadataApplier> = if self.config.storage.apply_metadata {
            Arc::clone(&self.metadata)
        } else {
            debug!("Metadata application disabled");
            Arc::new(NoopMetadata)
        };
        let sink = PersistenceSink::new(UniqueNameResolver::new(&self.save_dir), metadata);

        let server = &self.config.server;
        let context = SessionContext::new(sink)
            .with_timeouts(server.handshake_timeout(), server.write_timeout())
            .with_registry(Arc::clone(&self.registry))
            .with_events(self.event_tx.clone())
            .with_shutdown(self.shutdown_token.clone());

        let acceptor_config =
            AcceptorConfig::from_server_config(server).context("Invalid listener settings")?;

        Acceptor::bind(acceptor_config, Arc::new(context))
            .await
            .context("Failed to start listener")
    }

    /// Stops the daemon orchestrator gracefully.
    ///
    /// Idle sessions are closed; a transfer already being written finishes first.
    pub async fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != OrchestratorState::Running {
                anyhow::bail!("Orchestrator is not running");
            }
            *state = OrchestratorState::ShuttingDown;
        }
        self.emit_event(OrchestratorEvent::StateChanged(OrchestratorState::ShuttingDown));

        info!("Stopping daemon orchestrator...");

        self.shutdown_token.cancel();

        if let Some(task) = self.acceptor_task.take() {
            if let Err(e) = task.await {
                warn!("Acceptor task ended abnormally: {}", e);
            }
        }

        // A fresh token allows a later restart.
        self.shutdown_token = CancellationToken::new();
        self.local_addr = None;

        self.set_state(OrchestratorState::Stopped).await;

        let stats = self.stats();
        info!(
            files_saved = stats.files_saved,
            transfers_rejected = stats.transfers_rejected,
            "Daemon orchestrator stopped"
        );
        Ok(())
    }

    /// Emits an orchestrator event.
    fn emit_event(&self, event: OrchestratorEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use protocol::{FileTransferFrame, ACK_MESSAGE};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = 0;
        config
    }

    fn create_orchestrator(temp_dir: &TempDir) -> DaemonOrchestrator {
        DaemonOrchestrator::new(
            create_test_config(),
            temp_dir.path().to_path_buf(),
            Arc::new(NoopMetadata),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_orchestrator_creation() {
        let temp_dir = TempDir::new().unwrap();

        let orchestrator = create_orchestrator(&temp_dir);

        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
        assert_eq!(orchestrator.local_addr(), None);
        assert_eq!(orchestrator.stats(), DaemonStats::default());
    }

    #[tokio::test]
    async fn test_missing_save_dir_is_rejected() {
        let temp_dir = TempDir::new().unwrap();

        let result = DaemonOrchestrator::new(
            create_test_config(),
            temp_dir.path().join("missing"),
            Arc::new(NoopMetadata),
        );

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let temp_dir = TempDir::new().unwrap();
        let mut orchestrator = create_orchestrator(&temp_dir);
        let mut events = orchestrator.subscribe();

        orchestrator.start().await.unwrap();
        assert_eq!(orchestrator.state().await, OrchestratorState::Running);
        assert!(orchestrator.local_addr().unwrap().port() != 0);
        assert!(orchestrator.start().await.is_err());

        orchestrator.stop().await.unwrap();
        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);

        let mut states = Vec::new();
        while let Ok(OrchestratorEvent::StateChanged(state)) = events.try_recv() {
            states.push(state);
        }
        assert_eq!(
            states,
            vec![
                OrchestratorState::Starting,
                OrchestratorState::Running,
                OrchestratorState::ShuttingDown,
                OrchestratorState::Stopped,
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let temp_dir = TempDir::new().unwrap();
        let mut orchestrator = create_orchestrator(&temp_dir);

        assert!(orchestrator.stop().await.is_err());
    }

    #[tokio::test]
    async fn test_bind_failure_returns_to_stopped() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = create_test_config();
        config.server.port = blocker.local_addr().unwrap().port();
        let mut orchestrator =
            DaemonOrchestrator::new(config, temp_dir.path().to_path_buf(), Arc::new(NoopMetadata))
                .unwrap();

        assert!(orchestrator.start().await.is_err());
        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_start_can_be_retried() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = blocker.local_addr().unwrap().port();
        let mut config = create_test_config();
        config.server.port = port;
        let mut orchestrator =
            DaemonOrchestrator::new(config, temp_dir.path().to_path_buf(), Arc::new(NoopMetadata))
                .unwrap();

        assert!(orchestrator.start().await.is_err());
        drop(blocker);

        orchestrator.start().await.unwrap();
        assert_eq!(orchestrator.state().await, OrchestratorState::Running);
        assert_eq!(orchestrator.local_addr().unwrap().port(), port);

        orchestrator.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_bind_address_returns_to_stopped() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = create_test_config();
        config.server.bind_address = "not-an-address".into();
        let mut orchestrator =
            DaemonOrchestrator::new(config, temp_dir.path().to_path_buf(), Arc::new(NoopMetadata))
                .unwrap();

        assert!(orchestrator.start().await.is_err());
        assert_eq!(orchestrator.state().await, OrchestratorState::Stopped);
        assert_eq!(orchestrator.local_addr(), None);
    }

    #[tokio::test]
    async fn test_upload_events_and_stats() {
        let temp_dir = TempDir::new().unwrap();
        let mut orchestrator = create_orchestrator(&temp_dir);
        let mut events = orchestrator.subscribe();
        orchestrator.start().await.unwrap();
        let addr = orchestrator.local_addr().unwrap();

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let frame = FileTransferFrame::new("photo.jpg", 0.0, vec![0xFF, 0xD8, 0xFF]);
        ws.send(Message::Binary(frame.encode().unwrap())).await.unwrap();
        let reply = ws.next().await.unwrap().unwrap();
        assert_eq!(reply, Message::Text(ACK_MESSAGE.into()));

        let saved = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let OrchestratorEvent::FileSaved { path, bytes, .. } = events.recv().await.unwrap() {
                    return (path, bytes);
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(saved, (temp_dir.path().join("photo.jpg"), 3));
        assert_eq!(orchestrator.stats().files_saved, 1);

        ws.close(None).await.unwrap();
        orchestrator.stop().await.unwrap();
        assert_eq!(orchestrator.stats().active_sessions, 0);
    }

    #[tokio::test]
    async fn test_stop_closes_idle_sessions() {
        let temp_dir = TempDir::new().unwrap();
        let mut orchestrator = create_orchestrator(&temp_dir);
        orchestrator.start().await.unwrap();
        let addr = orchestrator.local_addr().unwrap();

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), orchestrator.stop())
            .await
            .unwrap()
            .unwrap();

        // The server side closed; the client sees the close or end of stream.
        let next = tokio::time::timeout(Duration::from_secs(5), ws.next()).await.unwrap();
        assert!(!matches!(next, Some(Ok(Message::Binary(_)))));
    }
}
