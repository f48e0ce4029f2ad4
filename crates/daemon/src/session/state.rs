//! Session lifecycle states.

use std::fmt;

use thiserror::Error;
use tracing::debug;

/// Where a session is in its lifecycle.
///
/// ```text
/// Accepting -> Handshaking -> AwaitingMessage <-> Processing
///                                   any live state -> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// The TCP connection has been accepted.
    Accepting,
    /// The WebSocket upgrade is in progress.
    Handshaking,
    /// Idle, waiting for the next complete message.
    AwaitingMessage,
    /// Handling one message.
    Processing,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Returns true if moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Accepting, Handshaking)
                | (Handshaking, AwaitingMessage)
                | (AwaitingMessage, Processing)
                | (Processing, AwaitingMessage)
                | (Accepting | Handshaking | AwaitingMessage | Processing, Closed)
        )
    }

    /// Returns true for the terminal state.
    pub fn is_terminal(self) -> bool {
        self == SessionState::Closed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Accepting => "accepting",
            SessionState::Handshaking => "handshaking",
            SessionState::AwaitingMessage => "awaiting_message",
            SessionState::Processing => "processing",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid session transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Tracks the current state and enforces legal transitions.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: SessionState,
    transitions: u64,
}

impl StateMachine {
    /// Start in [`SessionState::Accepting`].
    pub fn new() -> Self {
        Self::starting_at(SessionState::Accepting)
    }

    /// Start in an arbitrary state.
    pub fn starting_at(state: SessionState) -> Self {
        Self {
            state,
            transitions: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of successful transitions so far.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Move to `next`, leaving the state untouched if the move is illegal.
    pub fn transition(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        debug!(from = %self.state, to = %next, "Session state change");
        self.state = next;
        self.transitions += 1;
        Ok(())
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
