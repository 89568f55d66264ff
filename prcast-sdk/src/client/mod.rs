//! WebSocket client for the prcast notification stream.
//!
//! Gated behind the `client` cargo feature so crates that only need the
//! shared types do not pull in `tokio-tungstenite`.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::objects::{ClientMessage, PullRequestRef, ServerMessage};

/// Errors produced by [`RelayClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server closed the connection.
    #[error("connection closed")]
    Closed,
}

/// Typed client for `GET /ws`.
pub struct RelayClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayClient {
    /// Open a connection to `url`, e.g. `ws://localhost:8765/ws`.
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (stream, _response) = connect_async(url).await?;
        Ok(Self { stream })
    }

    /// Bind the connection to `username`.
    ///
    /// The server answers with an `introduced` snapshot, read it with
    /// [`next_message`](Self::next_message).
    pub async fn introduce(&mut self, username: impl Into<String>) -> Result<(), ClientError> {
        self.send(&ClientMessage::Introduce(username.into())).await
    }

    /// Ask the pending reviewers of `pull_request` for a review.
    pub async fn remind(&mut self, pull_request: PullRequestRef) -> Result<(), ClientError> {
        self.send(&ClientMessage::Remind(pull_request)).await
    }

    /// Wait for the next server message, skipping control frames.
    pub async fn next_message(&mut self) -> Result<ServerMessage, ClientError> {
        while let Some(frame) = self.stream.next().await {
            match frame? {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(_) => return Err(ClientError::Closed),
                _ => continue,
            }
        }
        Err(ClientError::Closed)
    }

    /// Send a close frame and wait for the server to acknowledge it.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        let json = serde_json::to_string(message)?;
        self.stream.send(Message::Text(json)).await?;
        Ok(())
    }
}
