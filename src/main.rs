//! Quote Stream - market data client daemon
//!
//! Connects to the streaming service, fetches recent history and streams ticks
//! for the configured symbols, and serves health and metrics over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use prometheus::{Encoder, Registry, TextEncoder};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use quote_stream::{Config, StreamClient, TopicEvent};

/// Application state shared with the HTTP handlers
struct AppState {
    client: StreamClient,
    registry: Registry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Quote Stream client");

    let config = Config::load()?;
    info!(
        endpoints = ?config.client.endpoints,
        symbols = ?config.symbols,
        "Configuration loaded"
    );

    let client = StreamClient::new(config.client.clone())?;
    let registry = Registry::new();
    client.metrics().register(&registry)?;

    client.on_open(|| info!("Stream connected"));
    client.on_close(|| warn!("Stream disconnected"));
    client.on_error(|e| warn!(error = %e, "Stream error"));
    client.on_authenticated(|account| match account {
        Some(account) => info!(loginid = %account.loginid, currency = %account.currency, "Authenticated"),
        None => info!("Not authenticated"),
    });
    client.on_balance(|balance| {
        info!(balance = %balance.balance, currency = %balance.currency, "Balance changed")
    });

    let state = Arc::new(AppState {
        client: client.clone(),
        registry,
    });
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(state, health_port).await {
            warn!(error = %e, "Health server error");
        }
    });

    client.connect().await?;

    if let Some(token) = &config.api_token {
        match client.authorize(token).await {
            Ok(_) => {
                if let Err(e) = client.balance().await {
                    warn!(error = %e, "Balance request failed");
                }
            }
            Err(e) => error!(error = %e, "Authorization failed"),
        }
    }

    for symbol in &config.symbols {
        match client.request_history(symbol, config.history_count).await {
            Ok(history) => info!(symbol = %symbol, ticks = history.len(), "History received"),
            Err(e) => warn!(symbol = %symbol, error = %e, "History request failed"),
        }

        client
            .subscribe(symbol, |event| match event {
                TopicEvent::Tick(tick) => {
                    info!(symbol = %tick.symbol, quote = %tick.quote, epoch = tick.epoch, "Tick")
                }
                TopicEvent::Rejected(e) => {
                    warn!(code = %e.code, message = %e.message, "Subscription rejected")
                }
            })
            .await?;
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    client.disconnect().await?;

    Ok(())
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(state: Arc<AppState>, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let connected = state.client.connection_status();
    Json(serde_json::json!({
        "status": if connected { "healthy" } else { "degraded" },
        "component": "quote-stream",
        "connected": connected,
        "state": state.client.state().to_string(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let metric_families = state.registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
