//! Forno Attendant - order board service.
//!
//! Serves the attendant's live order board on port 3002.
//!
//! # Architecture
//!
//! - Axum HTTP API (see [`forno_attendant::routes`])
//! - PostgREST for reads and status updates
//! - Realtime WebSocket subscription on `orders` and `order_items`; every
//!   debounced change refreshes the board

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use forno_attendant::config::AttendantConfig;
use forno_attendant::rest::RestClient;
use forno_attendant::{AppState, Backend, HealthService, OrderBoard, RetryPolicy};
use forno_realtime::{PhoenixTransport, SubscriptionOptions};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &AttendantConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let config = AttendantConfig::from_env().expect("Failed to load configuration");

    // Sentry must be initialized before the tracing subscriber
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "forno_attendant=info,forno_realtime=info,tower_http=debug".into()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let health = HealthService::new();
    let rest = RestClient::new(&config.supabase).expect("Failed to build REST client");
    let backend: Arc<dyn Backend> = Arc::new(rest);

    let board = OrderBoard::new(Arc::clone(&backend), health.clone(), RetryPolicy::default());
    match board.refresh().await {
        Ok(count) => tracing::info!(count, "order board loaded"),
        // Keep serving: /orders answers 503 until a refresh succeeds
        Err(e) => tracing::warn!(error = %e, "initial order load failed"),
    }

    let transport = PhoenixTransport::new(
        config.supabase.url.as_str(),
        config.supabase.anon_key.clone(),
        config.supabase.service_token.clone(),
    )
    .expect("Invalid realtime endpoint");
    let options = SubscriptionOptions::new(config.realtime.channel.clone())
        .debounce(config.realtime.debounce);
    let subscription = board.connect_realtime(Arc::new(transport), options);

    let app = forno_attendant::app(AppState::new(board, backend, health))
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("attendant listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    subscription.close().await;
    tracing::info!("realtime subscription closed");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
