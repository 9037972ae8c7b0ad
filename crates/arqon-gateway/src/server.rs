//! Boots the axum app: the `/ws` upgrade route plus the `/health` and
//! `/metrics` endpoints external monitoring collaborators poll. Owns
//! graceful shutdown sequencing (spec §5: stop accepting, drain best-effort,
//! flush telemetry, close storage).

use std::net::SocketAddr;
use std::sync::Arc;

use arqon_metrics::MetricsHandle;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router as AxumRouter};
use chrono::Utc;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth;
use crate::connection;
use crate::error::{Error, Result};
use crate::state::GatewayState;

#[derive(Clone)]
struct AppState {
    gateway: Arc<GatewayState>,
    metrics: Arc<MetricsHandle>,
}

/// Token carried either as a query parameter or a `Bearer` header; the
/// connect token never rides in the upgraded socket's first frame, so a
/// rejected auth attempt can fail the upgrade itself with a plain HTTP 401.
#[derive(Debug, Deserialize)]
struct ConnectQuery {
    token: Option<String>,
}

/// Builds the axum app without binding a listener. Exposed so integration
/// tests can drive a real socket against an in-process server.
pub fn build_app(gateway: Arc<GatewayState>, metrics: Arc<MetricsHandle>) -> AxumRouter {
    let state = AppState { gateway, metrics };
    AxumRouter::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if state.gateway.config.security.enable_authentication {
        let token = query.token.as_deref().or_else(|| bearer_token(&headers));
        let secret = state.gateway.config.security.shared_secret.as_deref().unwrap_or("");
        let now = Utc::now().timestamp();
        let authenticated = token.is_some_and(|t| auth::verify_token(t, secret, now).is_ok());
        if !authenticated {
            warn!("rejected websocket upgrade: missing or invalid connect token");
            state.gateway.telemetry.authentication_failed("(unregistered)", "invalid connect token").await;
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let gateway = state.gateway.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, gateway))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ")
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.gateway.router.health();
    Json(serde_json::json!({
        "status": match health.status {
            arqon_router::RouterStatus::Healthy => "ok",
            arqon_router::RouterStatus::Degraded => "degraded",
        },
        "connections": state.gateway.connection_count(),
        "clients": state.gateway.registry.client_count().await,
        "operators": state.gateway.operators.total_operators().await,
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], state.metrics.render())
}

/// Binds the listener and serves until a shutdown signal arrives, then
/// drains the broker.
pub async fn serve(gateway: Arc<GatewayState>, metrics: Arc<MetricsHandle>) -> Result<()> {
    let host = gateway.config.server.host.clone();
    let port = gateway.config.server.port;
    let addr: SocketAddr = format!("{host}:{port}").parse().map_err(|_| Error::Bind {
        addr: format!("{host}:{port}"),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid host or port"),
    })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr: addr.to_string(), source })?;
    info!(%addr, "arqonbus listening");

    gateway.telemetry.system_started().await;
    let app = build_app(gateway.clone(), metrics);
    let shutdown = gateway.shutdown.clone();

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    drain(&gateway).await;
    Ok(())
}

/// Resolves on SIGINT, SIGTERM, or an externally triggered
/// [`GatewayState::shutdown`] cancellation, whichever comes first — and
/// cancels the token itself so every connection's child tasks unwind too.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}

/// Best-effort drain: flush telemetry to its fan-out peer, then close
/// storage. Live connections are not forcibly severed; they unwind as their
/// own cancellation tokens (children of `shutdown`) are cancelled.
async fn drain(gateway: &Arc<GatewayState>) {
    info!("draining: flushing telemetry and closing storage");
    gateway.telemetry.flush().await;
    gateway.telemetry.system_stopped().await;
    gateway.storage.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use arqon_config::ArqonBusConfig;

    #[tokio::test]
    async fn drain_flushes_and_closes_without_panicking() {
        let gateway = GatewayState::new(ArqonBusConfig::default()).await.unwrap();
        drain(&gateway).await;
    }
}
