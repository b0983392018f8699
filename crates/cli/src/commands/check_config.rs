//! Configuration check.
//!
//! Loads the same `SUPABASE_*` variables the attendant uses, runs the secret
//! checks, and with `--ping` makes one real request.

use forno_attendant::Backend;
use forno_attendant::config::SupabaseConfig;
use forno_attendant::rest::RestClient;
use forno_realtime::PhoenixTransport;
use tracing::info;

use super::CommandError;

/// Validate the backend configuration.
///
/// # Errors
///
/// Returns an error if a variable is missing or weak, the URL cannot be
/// turned into a realtime endpoint, or the ping request fails.
pub async fn run(ping: bool) -> Result<(), CommandError> {
    dotenvy::dotenv().ok();

    let config = SupabaseConfig::from_env()?;
    info!(?config, "Supabase configuration loaded");

    let transport = PhoenixTransport::new(
        config.url.as_str(),
        config.anon_key.clone(),
        config.service_token.clone(),
    )?;
    info!(?transport, "Realtime endpoint ok");

    if ping {
        let client = RestClient::new(&config)?;
        let zones = client.delivery_zones().await?;
        info!(zones = zones.len(), "REST API reachable");
    }

    info!("Configuration ok");
    Ok(())
}
