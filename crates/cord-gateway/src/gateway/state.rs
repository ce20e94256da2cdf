//! Session state types.

use std::sync::atomic::{AtomicU32, Ordering};

/// State of a gateway session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Obtaining a socket.
    Connecting,
    /// Socket open, waiting for HELLO.
    AwaitingHello,
    /// HELLO received, handshake sent, heartbeating.
    Active,
    /// Socket discarded, waiting to connect again.
    Reconnecting,
    /// Permanently failed.
    Failed,
    /// Closed by the caller.
    Closed,
}

impl SessionState {
    /// Whether the session can no longer change state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Atomic wrapper for session state.
#[derive(Debug)]
pub struct AtomicSessionState(AtomicU32);

impl AtomicSessionState {
    /// Create a new atomic state.
    #[must_use]
    pub const fn new(state: SessionState) -> Self {
        Self(AtomicU32::new(state as u32))
    }

    /// Load the current state.
    #[must_use]
    pub fn load(&self) -> SessionState {
        match self.0.load(Ordering::SeqCst) {
            0 => SessionState::Connecting,
            1 => SessionState::AwaitingHello,
            2 => SessionState::Active,
            3 => SessionState::Reconnecting,
            4 => SessionState::Failed,
            _ => SessionState::Closed,
        }
    }

    /// Store a new state.
    pub fn store(&self, state: SessionState) {
        self.0.store(state as u32, Ordering::SeqCst);
    }
}
