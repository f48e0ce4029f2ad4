//! # FileDrop Daemon Library
//!
//! This crate provides the receiving side of FileDrop: a WebSocket server
//! that accepts binary file frames and writes them into a local directory.
//!
//! ## Overview
//!
//! - **Acceptor**: Listens for TCP connections and upgrades them to WebSocket
//! - **Sessions**: One task per client; parse, store, acknowledge, repeat
//! - **Files**: Collision-free naming and durable writes
//! - **Platform**: Save-directory selection and capture-time metadata
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Daemon Orchestrator                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │                       Acceptor                        │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! │        │ spawn per connection                               │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐                │
//! │  │  Session  │  │  Session  │  │  Session  │  ── registry   │
//! │  └───────────┘  └───────────┘  └───────────┘                │
//! │        │ FileTransferFrame                                  │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │   PersistenceSink (UniqueNameResolver + metadata)     │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use daemon::{Config, DaemonOrchestrator};
//! use daemon::platform::FileTimeMetadata;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!
//!     let mut orchestrator =
//!         DaemonOrchestrator::new(config, "/tmp/inbox".into(), Arc::new(FileTimeMetadata))?;
//!     orchestrator.start().await?;
//!
//!     // Files are now being received...
//!
//!     orchestrator.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`files`]: Name sanitizing, unique naming and persistence
//! - [`network`]: WebSocket transport and connection acceptor
//! - [`platform`]: Directory selection and file metadata
//! - [`session`]: Per-connection upload sessions
//! - [`orchestrator`]: Main daemon coordinator

pub mod config;
pub mod files;
pub mod network;
pub mod orchestrator;
pub mod platform;
pub mod session;

// Re-export protocol for convenience
pub use protocol;

pub use config::Config;

pub use files::{PersistenceSink, StoredFile, UniqueNameResolver};

pub use network::{Acceptor, AcceptorConfig, MessageConnection, WebSocketConnection};

pub use platform::{DirectorySelector, MetadataApplier};

pub use session::{
    DaemonStats, Session, SessionContext, SessionId, SessionInfo, SessionOutcome, SessionState,
};

pub use orchestrator::{DaemonOrchestrator, OrchestratorEvent, OrchestratorState};
