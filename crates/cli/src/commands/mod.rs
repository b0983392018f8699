//! Subcommand implementations.

pub mod check_config;
pub mod price;
pub mod watch;

use forno_attendant::config::ConfigError;
use forno_attendant::rest::RestError;
use forno_realtime::RealtimeError;
use thiserror::Error;

/// Errors that can end a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Environment is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Realtime endpoint or options rejected.
    #[error("Realtime error: {0}")]
    Realtime(#[from] RealtimeError),

    /// REST request failed.
    #[error("Backend error: {0}")]
    Rest(#[from] RestError),

    /// The argument is not an amount.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The subscription spent its retries.
    #[error("gave up reconnecting to channel {0}")]
    GaveUp(String),
}
