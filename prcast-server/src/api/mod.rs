//! HTTP and WebSocket handlers.
//!
//! # Endpoints
//!
//! - `POST /webhook` – Bitbucket webhook receiver (`X-Event-Key` header)
//! - `GET  /ws`      – WebSocket notification stream

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

#[cfg(test)]
pub(crate) use webhook::EVENT_KEY_HEADER;

mod webhook;
mod ws;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook", post(webhook::receive_webhook))
        .route("/ws", get(ws::notifications_ws))
}
