//! Forno CLI - operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Follow order changes from the terminal
//! forno watch attendant-orders --table orders --table order_items
//!
//! # Format an amount the way the storefront shows it
//! forno price 1000          # R$ 1.000,00
//!
//! # Validate SUPABASE_* settings, optionally hitting the API
//! forno check-config --ping
//! ```
//!
//! # Commands
//!
//! - `watch` - Subscribe to a realtime channel and log each coalesced change
//! - `price` - Print an amount formatted in reais
//! - `check-config` - Load and validate the backend configuration

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "forno")]
#[command(author, version, about = "Forno operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a realtime channel until Ctrl+C
    Watch {
        /// Channel name
        #[arg(default_value = "attendant-orders")]
        channel: String,

        /// Table to watch (repeatable)
        #[arg(short, long = "table", default_values = ["orders", "order_items"])]
        tables: Vec<String>,

        /// Quiet period before a burst of changes is reported
        #[arg(short, long, default_value_t = 300)]
        debounce_ms: u64,
    },
    /// Format an amount in reais (accepts `1000`, `45,90`, `-10.5`)
    Price {
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },
    /// Check the Supabase configuration
    CheckConfig {
        /// Also fetch delivery zones to prove the credentials work
        #[arg(long)]
        ping: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forno=info,forno_realtime=info".into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Watch {
            channel,
            tables,
            debounce_ms,
        } => commands::watch::run(channel, &tables, debounce_ms).await,
        Commands::Price { amount } => commands::price::run(&amount),
        Commands::CheckConfig { ping } => commands::check_config::run(ping).await,
    }
}
