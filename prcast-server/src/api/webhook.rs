use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::state::AppState;

/// Header carrying the Bitbucket event key, e.g. `pullrequest:created`.
pub(crate) const EVENT_KEY_HEADER: &str = "x-event-key";

/// Errors that can occur in the webhook handler.
#[derive(Debug)]
pub(super) enum WebhookApiError {
    MissingEventKey,
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            WebhookApiError::MissingEventKey => {
                (StatusCode::BAD_REQUEST, "missing X-Event-Key header").into_response()
            }
        }
    }
}

/// `POST /webhook`: receive a Bitbucket webhook.
///
/// Runs every handler registered for the event key and answers with the
/// per-handler outcome. Handler failures are reported in the body, never
/// as an error status, so Bitbucket does not keep retrying a delivery that
/// will fail the same way.
pub(super) async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, WebhookApiError> {
    let event_type = headers
        .get(EVENT_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(WebhookApiError::MissingEventKey)?;

    tracing::debug!(%event_type, "Received webhook");
    let outcome = state.classifier.dispatch(event_type, &body).await;
    Ok(Json(outcome))
}
