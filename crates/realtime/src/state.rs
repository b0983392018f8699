//! Connection state reported by a subscription.
//!
//! ```text
//!                 setup            ack
//! Disconnected ─────────► Connecting ─────► Connected
//!      ▲                   ▲     │              │
//!      │ disable/close     │     │ failure      │ transport error
//!      │                   │     ▼              ▼
//!      │                 backoff fires ◄─── Reconnecting ──► Exhausted
//!      │                                         retries spent
//!      └── clean close (from Connected)
//! ```

use std::fmt;

/// Where a subscription is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not subscribed: initial state, after a clean close, or while disabled.
    #[default]
    Disconnected,
    /// Channel opened, waiting for the subscribe acknowledgement.
    Connecting,
    /// Subscribed and receiving changes.
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting {
        /// Retry number about to be made (1-based).
        attempt: u32,
    },
    /// Retries spent. Nothing happens until a manual reconnect.
    Exhausted,
}

impl ConnectionState {
    /// Whether the subscription is currently not delivering changes and not
    /// trying to.
    #[must_use]
    pub const fn is_disconnected(self) -> bool {
        matches!(self, Self::Disconnected | Self::Exhausted)
    }

    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Short name for logs and status endpoints.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            other => f.write_str(other.as_str()),
        }
    }
}
