// HiveBoard serving layer: ingestion, query API, live broadcast and the
// background loops (retention, ping) around one shared Store.

pub mod alerts;
pub mod api;
pub mod auth;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod ingest;
pub mod rate_limit;
pub mod state;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Context;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Router};
use chrono::Utc;
use hiveboard_store::Store;
use hiveboard_types::{PRUNE_INTERVAL_SECONDS, WS_PING_INTERVAL_SECONDS};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::broadcast::{BridgeBus, NativeBus};
use crate::config::{Mode, ServerConfig};
use crate::state::AppState;

/// Assemble the full router for the given state.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/ingest", post(ingest::ingest_handler))
        .merge(api::router());

    if state.native.is_some() {
        router = router.route("/v1/stream", get(api::stream::stream_handler));
    }
    if state.bridge.is_some() {
        router = router
            .route("/ws/connect", post(api::bridge::ws_connect))
            .route("/ws/disconnect", post(api::bridge::ws_disconnect))
            .route("/ws/message", post(api::bridge::ws_message));
    }

    let mut router = router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .with_state(state.clone());

    if state.config.mode == Mode::Local {
        router = router.layer(CorsLayer::permissive());
    }
    router
}

async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Build state for a configuration: open the store, pick the broadcast
/// back-end, seed the dev tenant.
pub async fn build_state(config: ServerConfig) -> anyhow::Result<AppState> {
    config.validate()?;
    let store = Arc::new(Store::open(&config.data_dir).context("opening data directory")?);
    let config = Arc::new(config);

    let state = match config.mode {
        Mode::Local => AppState::with_native(store, config, Arc::new(NativeBus::new())),
        Mode::Production => {
            let endpoint = config
                .ws_gateway_endpoint
                .as_deref()
                .context("production mode requires ws_gateway_endpoint")?;
            let bridge = Arc::new(BridgeBus::new(endpoint));
            AppState::with_bridge(store, config.clone(), bridge)
        }
    };

    auth::bootstrap_dev_tenant(&state).await?;
    Ok(state)
}

/// Run the server until ctrl-c.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let state = build_state(config).await?;

    // Clear the retention backlog before accepting traffic
    let report = state.store.prune(Utc::now()).await?;
    if report.total_pruned > 0 {
        tracing::info!(
            ttl = report.ttl_pruned,
            cold = report.cold_pruned,
            "startup prune removed events"
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_prune_loop(state.clone(), shutdown_rx.clone());
    if state.native.is_some() {
        spawn_ping_loop(state.clone(), shutdown_rx);
    }

    let listener = tokio::net::TcpListener::bind(&state.config.listen)
        .await
        .with_context(|| format!("binding {}", state.config.listen))?;
    tracing::info!(addr = %state.config.listen, mode = ?state.config.mode, "hiveboard listening");

    let router = build_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
}

fn spawn_prune_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(StdDuration::from_secs(PRUNE_INTERVAL_SECONDS));
        // The startup prune already ran; skip the interval's immediate tick
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match state.store.prune(Utc::now()).await {
                        Ok(report) if report.total_pruned > 0 => {
                            tracing::info!(
                                ttl = report.ttl_pruned,
                                cold = report.cold_pruned,
                                "prune pass removed events"
                            );
                        }
                        Ok(_) => {}
                        // The loop survives failures; the next pass retries
                        Err(err) => tracing::warn!(error = %err, "prune pass failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    });
}

fn spawn_ping_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let Some(native) = state.native.clone() else {
        return;
    };
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(StdDuration::from_secs(WS_PING_INTERVAL_SECONDS));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let dropped = native.ping_pass().await;
                    if !dropped.is_empty() {
                        tracing::debug!(count = dropped.len(), "dropped unresponsive streams");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    });
}
