use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use prcast_core::delivery::{DeliverySender, NotifyError, connection_channel};
use prcast_sdk::objects::{ClientMessage, ServerMessage, WsCloseCode};
use uuid::Uuid;

use crate::state::AppState;

/// `GET /ws`: WebSocket notification stream.
///
/// The connection stays anonymous until the client introduces itself; from
/// then on it receives the pushes addressed to that username.
pub(super) async fn notifications_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Background task that drives a single WebSocket connection.
///
/// Forwards the connection's delivery channel to the socket and handles
/// client frames until the client disconnects or the server shuts down.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let connection = Uuid::new_v4();
    let (tx, mut rx) = connection_channel(state.config.delivery.channel_buffer);
    let mut shutdown_rx = state.shutdown.subscribe();
    tracing::debug!(%connection, "WS: connection opened");

    loop {
        if *shutdown_rx.borrow_and_update() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.changed() => {
                continue;
            }

            Some(message) = rx.recv() => {
                if send_json(&mut socket, &message).await.is_err() {
                    disconnect(&state, connection).await;
                    return;
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if handle_client_frame(&state, connection, &tx, &mut socket, text.as_str())
                            .await
                            .is_err()
                        {
                            disconnect(&state, connection).await;
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                        disconnect(&state, connection).await;
                        return;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    disconnect(&state, connection).await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: WsCloseCode::GOING_AWAY,
            reason: "server shutting down".into(),
        })))
        .await;
}

/// Apply one client frame. Returns `Err(())` if the socket is gone.
async fn handle_client_frame(
    state: &AppState,
    connection: Uuid,
    tx: &DeliverySender,
    socket: &mut WebSocket,
    text: &str,
) -> Result<(), ()> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(%connection, error = %e, "WS: invalid client frame");
            return send_error(socket, WsCloseCode::INVALID_MESSAGE, e.to_string()).await;
        }
    };

    match message {
        ClientMessage::Introduce(username) => {
            let username = username.trim();
            if username.is_empty() {
                return send_error(socket, WsCloseCode::INVALID_MESSAGE, "empty username").await;
            }
            state
                .notifier
                .introduce(username, connection, tx.clone())
                .await;
        }
        ClientMessage::Remind(key) => {
            if let Err(NotifyError::NotFound(key)) = state.notifier.remind(&key).await {
                return send_error(
                    socket,
                    WsCloseCode::PULL_REQUEST_NOT_FOUND,
                    format!("pull request {key} not found"),
                )
                .await;
            }
        }
    }
    Ok(())
}

async fn disconnect(state: &AppState, connection: Uuid) {
    if let Some(username) = state.channels().unregister(&connection).await {
        tracing::debug!(%connection, %username, "WS: client disconnected");
    }
}

async fn send_error(socket: &mut WebSocket, code: u16, reason: impl Into<String>) -> Result<(), ()> {
    send_json(
        socket,
        &ServerMessage::Error {
            code,
            reason: reason.into(),
        },
    )
    .await
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}
