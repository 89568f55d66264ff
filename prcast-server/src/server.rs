//! Axum server setup and router configuration.

use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        // Webhook receiver and WebSocket stream
        .merge(crate::api::router())
        // Add state to all routes
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    pull_requests: usize,
    connections: usize,
}

/// Health check with registry and connection counts.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        pull_requests: state.registry.len().await,
        connections: state.channels().connection_count().await,
    })
}

/// Run the server with graceful shutdown support.
pub async fn run_server(state: AppState, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);
    serve(listener, state, shutdown_signal()).await
}

/// Serve on `listener` until `signal` completes.
///
/// When the signal fires the shutdown flag is raised and every delivery
/// channel is closed, so open WebSocket connections end with a close frame
/// instead of holding the graceful shutdown open.
pub async fn serve<F>(listener: TcpListener, state: AppState, signal: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let shutdown = state.shutdown.clone();
    let channels = state.channels().clone();

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            signal.await;
            shutdown.trigger();
            channels.close_all().await;
        })
        .await
}
