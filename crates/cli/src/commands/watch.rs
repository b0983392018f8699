//! Follow a realtime channel from the terminal.
//!
//! # Environment Variables
//!
//! - `SUPABASE_URL` - Project URL
//! - `SUPABASE_ANON_KEY` - Public API key
//! - `SUPABASE_SERVICE_TOKEN` - Optional bearer with wider row visibility

use std::sync::Arc;
use std::time::Duration;

use forno_attendant::config::SupabaseConfig;
use forno_realtime::{
    ConnectionState, PhoenixTransport, RealtimeSubscription, SubscriptionOptions, TableWatch,
    validate,
};
use tracing::{info, warn};

use super::CommandError;

/// Subscribe and log every coalesced change until Ctrl+C.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, no table was given, or
/// the subscription gives up reconnecting.
pub async fn run(channel: String, tables: &[String], debounce_ms: u64) -> Result<(), CommandError> {
    dotenvy::dotenv().ok();
    let config = SupabaseConfig::from_env()?;

    let options = tables
        .iter()
        .fold(SubscriptionOptions::new(channel.clone()), |options, table| {
            options.watch(TableWatch::new(table.as_str()))
        })
        .debounce(Duration::from_millis(debounce_ms));
    validate(&options)?;

    let transport = PhoenixTransport::new(
        config.url.as_str(),
        config.anon_key.clone(),
        config.service_token.clone(),
    )?;

    info!(%channel, ?tables, "Watching realtime channel (Ctrl+C to stop)");
    let handle = RealtimeSubscription::spawn(Arc::new(transport), options, |change| {
        info!(
            table = %change.table,
            kind = %change.kind,
            row = change.row_id().unwrap_or("-"),
            "change"
        );
    });

    let mut states = handle.watch_state();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = *states.borrow_and_update();
                match state {
                    ConnectionState::Reconnecting { attempt } => {
                        warn!(attempt, "connection lost, retrying");
                    }
                    ConnectionState::Exhausted => break Err(CommandError::GaveUp(channel)),
                    other => info!(state = other.as_str(), "connection state"),
                }
            }
        }
    };

    handle.close().await;
    outcome
}
