//! Feed Connection State
//!
//! The per-asset streaming client lifecycle and the shared status record that
//! the client writes and the read API observes.
//!
//! ```text
//! Idle ──start──► Connecting ──handshake──► Streaming
//!                     ▲                        │
//!                     │ delay            error │ close
//!                     └──── Reconnecting ◄─────┘
//! ```
//!
//! `stop()` returns any state to `Idle`.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Lifecycle state of a streaming client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not running (initial state, and the state after `stop()`).
    #[default]
    Idle,
    /// Opening the connection.
    Connecting,
    /// Connected and receiving messages.
    Streaming,
    /// Waiting out the reconnect delay after a failure.
    Reconnecting,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
        }
    }

    /// Whether a client in this state is still running.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable status of one streaming client.
#[derive(Debug, Default)]
pub struct ConnectionStatus {
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    reconnect_attempts: AtomicU32,
    total_reconnects: AtomicU64,
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
    ticks_appended: AtomicU64,
}

impl ConnectionStatus {
    /// Create a status in the `Idle` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection state.
    ///
    /// Entering `Streaming` records the connection time and clears the
    /// consecutive reconnect counter and last error.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Streaming {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.last_error.write() = None;
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// Record a transport failure.
    pub fn set_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    /// Record a reconnect attempt.
    pub fn increment_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
        self.total_reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an inbound message, and whether it produced a stored tick.
    pub fn record_message(&self, stored: bool) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        if stored {
            self.ticks_appended.fetch_add(1, Ordering::Relaxed);
        } else {
            self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Consecutive reconnect attempts since the last successful connection.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every field.
    #[must_use]
    pub fn report(&self) -> StatusReport {
        StatusReport {
            state: self.state(),
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            total_reconnects: self.total_reconnects.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            ticks_appended: self.ticks_appended.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of a [`ConnectionStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Current state.
    pub state: ConnectionState,
    /// When the client last entered `Streaming`.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent transport error, cleared on reconnect.
    pub last_error: Option<String>,
    /// Consecutive reconnect attempts.
    pub reconnect_attempts: u32,
    /// Reconnects over the client's lifetime.
    pub total_reconnects: u64,
    /// Inbound messages received.
    pub messages_received: u64,
    /// Inbound messages dropped as unparseable or invalid.
    pub messages_dropped: u64,
    /// Ticks stored.
    pub ticks_appended: u64,
}
