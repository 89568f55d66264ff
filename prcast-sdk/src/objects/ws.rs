//! WebSocket message types for the notification stream.
//!
//! The `GET /ws` endpoint upgrades to a WebSocket connection. Every frame is
//! a JSON text frame of the form `{"event": <name>, "data": <payload>}`.
//!
//! # Protocol
//!
//! 1. The client sends [`ClientMessage::Introduce`] with its username. The
//!    server sends nothing before that.
//! 2. The server answers with [`ServerMessage::Introduced`] carrying every
//!    pull request the user authored or is reviewing.
//! 3. Whenever one of those pull requests changes, the server pushes
//!    [`ServerMessage::PullRequestsUpdated`] with the user's recomputed view.
//! 4. A client may send [`ClientMessage::Remind`]; every reviewer that has
//!    not approved yet receives [`ServerMessage::Remind`].

use serde::{Deserialize, Serialize};

use super::pull_request::{PullRequest, PullRequestRef, User, UserPullRequests};

/// Event type attached to introduction snapshots.
pub const INTRODUCE_EVENT: &str = "client:introduce";

/// Client-to-server WebSocket message.
///
/// ```json
/// {"event":"introduce","data":"alice"}
/// {"event":"remind","data":{"repository":"team/app","id":42}}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to a username.
    Introduce(String),
    /// Ask the pending reviewers of a pull request to take a look.
    Remind(PullRequestRef),
}

/// Server-to-client WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// Snapshot sent right after an introduction.
    #[serde(rename = "introduced")]
    Introduced(NotificationPayload),
    /// A pull request relevant to this user changed.
    #[serde(rename = "pullrequests:updated")]
    PullRequestsUpdated(NotificationPayload),
    /// Someone asked this user to review a pull request.
    #[serde(rename = "remind")]
    Remind(PullRequestRef),
    /// A client frame could not be processed. The connection stays open.
    #[serde(rename = "error")]
    Error { code: u16, reason: String },
}

/// Per-recipient notification envelope.
///
/// `pull_requests` is recomputed for each recipient at send time, so two
/// recipients of the same transition receive different views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Originating event, e.g. `webhook:pullrequest:approved` or
    /// [`INTRODUCE_EVENT`].
    pub event_type: String,
    /// Who triggered the event, when known.
    #[serde(default)]
    pub actor: Option<User>,
    /// The pull request that changed; absent for introduction snapshots.
    #[serde(default)]
    pub pull_request: Option<PullRequest>,
    /// The recipient's current relevant pull requests.
    pub pull_requests: UserPullRequests,
}

/// Well-known WebSocket error and close codes.
///
/// Codes in the 4000–4999 range are reserved for application use by
/// [RFC 6455 §7.4.2](https://www.rfc-editor.org/rfc/rfc6455#section-7.4.2).
pub struct WsCloseCode;

impl WsCloseCode {
    /// The server is shutting down.
    pub const GOING_AWAY: u16 = 1001;

    /// A client frame was not a valid [`ClientMessage`].
    pub const INVALID_MESSAGE: u16 = 4000;

    /// A remind request named a pull request the server does not know.
    pub const PULL_REQUEST_NOT_FOUND: u16 = 4004;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"event":"introduce","data":"alice"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Introduce("alice".to_string()));

        let msg: ClientMessage = serde_json::from_str(
            r#"{"event":"remind","data":{"repository":"team/app","id":42}}"#,
        )
        .unwrap();
        assert_eq!(msg, ClientMessage::Remind(PullRequestRef::new("team/app", 42)));
    }

    #[test]
    fn test_server_message_event_names() {
        let payload = NotificationPayload {
            event_type: INTRODUCE_EVENT.to_string(),
            actor: None,
            pull_request: None,
            pull_requests: UserPullRequests::default(),
        };
        let json = serde_json::to_value(ServerMessage::PullRequestsUpdated(payload)).unwrap();
        assert_eq!(json["event"], "pullrequests:updated");
        assert_eq!(json["data"]["event_type"], "client:introduce");

        let json =
            serde_json::to_value(ServerMessage::Remind(PullRequestRef::new("team/app", 1))).unwrap();
        assert_eq!(json["event"], "remind");
        assert_eq!(json["data"]["id"], 1);
    }
}
