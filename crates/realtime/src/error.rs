//! Error types for realtime subscriptions.

use thiserror::Error;

/// Errors raised while opening or running a channel.
///
/// These never escape a running subscription: the driver turns them into
/// reconnect attempts and reports the outcome through
/// [`ConnectionState`](crate::ConnectionState).
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The realtime endpoint URL is malformed.
    #[error("invalid realtime endpoint: {0}")]
    InvalidEndpoint(String),

    /// The WebSocket handshake failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The server rejected or broke the channel protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A frame could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The channel has no tables to watch.
    #[error("channel {0} watches no tables")]
    NothingToWatch(String),
}

/// Errors from parsing a row filter expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// No `=` between column and operator.
    #[error("filter must look like column=op.value (got {0:?})")]
    Malformed(String),

    /// Column name is empty or not an identifier.
    #[error("invalid column in filter: {0:?}")]
    Column(String),

    /// Operator not supported by the change stream.
    #[error("unsupported filter operator: {0:?}")]
    Operator(String),

    /// Nothing after the operator.
    #[error("filter value cannot be empty")]
    EmptyValue,
}
