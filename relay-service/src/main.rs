//! Queue Relay server.
//!
//! Serves the queue management API, the delivery callback the queue backend
//! calls for each item, and the status/inbound webhooks.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use queue_relay::store::spawn_sweeper;
use queue_relay::web::{router, ApplicationIdentityVerifier};
use queue_relay::{AppState, Config, HttpForwarder, MemoryCorrelationStore, RabbitQueueBackend};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("relay_starting");

    let config = Config::from_env();
    info!(
        port = config.port,
        callback_base_url = %config.callback_base_url,
        default_max_inflight = config.default_max_inflight,
        default_msg_per_second = config.default_msg_per_second,
        dead_letter_exchange = ?config.dead_letter_exchange,
        processing_configured = config.processing_url.is_some(),
        internal_token_configured = config.internal_token.is_some(),
        status_forward_configured = config.status_forward_url.is_some(),
        reply_forward_configured = config.reply_forward_url.is_some(),
        inbound_destinations_configured =
            config.inbound_primary_url.is_some() && config.inbound_secondary_url.is_some(),
        inbound_failure_policy = ?config.inbound_failure_policy,
        application_id_configured = config.api_application_id.is_some(),
        "config_loaded"
    );

    // One pooled HTTP client for every outbound call
    let client = Client::builder()
        .pool_max_idle_per_host(100)
        .build()
        .context("Failed to create HTTP client")?;

    let backend = RabbitQueueBackend::new(
        config.amqp_url.clone(),
        &config.callback_base_url,
        config.dead_letter_exchange.clone(),
        client.clone(),
    )
    .context("Invalid CALLBACK_BASE_URL")?;

    let store = MemoryCorrelationStore::new();
    let sweeper = spawn_sweeper(store.clone(), config.correlation_sweep_interval);

    let forwarder = HttpForwarder::new(client.clone(), config.request_timeout);
    let identity = ApplicationIdentityVerifier::new(
        client,
        &config.identity_api_url,
        config.api_application_id.clone(),
        config.request_timeout,
    );

    let port = config.port;
    let state = AppState::new(
        config,
        Arc::new(backend.clone()),
        Arc::new(store),
        Arc::new(forwarder),
        Arc::new(identity),
    );

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "relay_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    info!(queues = ?backend.queue_names().await, "relay_stopping_consumers");
    backend.close().await;

    info!("relay_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("relay_shutting_down");
}
