//! Handler for `pullrequest:*` webhooks.
//!
//! | event keys                      | registry effect           |
//! |---------------------------------|---------------------------|
//! | created                         | insert (last write wins)  |
//! | updated, approved, unapproved   | replace                   |
//! | fulfilled, rejected             | remove                    |

use async_trait::async_trait;
use tracing::{info, warn};

use super::{HandleOutcome, HandlerError, PayloadHandler};
use crate::bitbucket::{DecodeError, PullRequestPayload, decode_webhook};
use crate::entities::{PullRequestRepository, RegistryError};
use crate::events::{PullRequestEvent, Transition, TransitionEvent};

const SUPPORTED_EVENTS: [&str; 6] = [
    "pullrequest:created",
    "pullrequest:updated",
    "pullrequest:fulfilled",
    "pullrequest:rejected",
    "pullrequest:approved",
    "pullrequest:unapproved",
];

/// Keeps the registry in step with Bitbucket pull request webhooks.
pub struct PullRequestHandler {
    registry: PullRequestRepository,
}

impl PullRequestHandler {
    pub fn new(registry: PullRequestRepository) -> Self {
        Self { registry }
    }

    /// Insert a new pull request.
    ///
    /// Bitbucket retries deliveries it considers failed, so a second
    /// `created` for a known identifier overwrites the stored entry.
    async fn on_created(&self, payload: &PullRequestPayload) -> Result<(), HandlerError> {
        let pr = payload.pull_request.clone();
        let key = pr.key();
        info!(pull_request = %key, "Adding a pull request to the repository");
        match self.registry.insert(pr).await {
            Err(RegistryError::Duplicate(_)) => {
                warn!(pull_request = %key, "Pull request already known, replacing it");
                self.registry.upsert(payload.pull_request.clone()).await;
                Ok(())
            }
            other => other.map_err(Into::into),
        }
    }

    async fn on_updated(
        &self,
        event: PullRequestEvent,
        payload: &mut PullRequestPayload,
    ) -> Result<(), HandlerError> {
        // The approval block is authoritative for the approving user even if
        // the participant list lags behind.
        if let Some(approver) = &payload.approval {
            let approved = match event {
                PullRequestEvent::Approved => Some(true),
                PullRequestEvent::Unapproved => Some(false),
                _ => None,
            };
            if let Some(approved) = approved {
                payload
                    .pull_request
                    .set_approval(&approver.username, approved);
            }
        }

        info!(pull_request = %payload.pull_request.key(), %event, "Updating a pull request");
        self.registry.replace(payload.pull_request.clone()).await?;
        Ok(())
    }

    async fn on_closed(&self, payload: &PullRequestPayload) -> Result<(), HandlerError> {
        let key = payload.pull_request.key();
        info!(pull_request = %key, "Closing a pull request");
        self.registry.remove(&key).await?;
        Ok(())
    }
}

#[async_trait]
impl PayloadHandler for PullRequestHandler {
    fn name(&self) -> &'static str {
        "pull_request"
    }

    fn supported_events(&self) -> &[&'static str] {
        &SUPPORTED_EVENTS
    }

    fn prepare_body(&self, raw_body: &str) -> Result<PullRequestPayload, DecodeError> {
        decode_webhook(raw_body)
    }

    #[tracing::instrument(skip_all, fields(event_type = %event_type))]
    async fn handle_payload(
        &self,
        event_type: &str,
        mut payload: PullRequestPayload,
    ) -> Result<HandleOutcome, HandlerError> {
        let Ok(event) = event_type.parse::<PullRequestEvent>() else {
            info!("Unhandled event payload: {}", event_type);
            return Ok(HandleOutcome::Unhandled(payload));
        };

        match event.transition() {
            Transition::Create => self.on_created(&payload).await?,
            Transition::Update => self.on_updated(event, &mut payload).await?,
            Transition::Close => self.on_closed(&payload).await?,
        }

        Ok(HandleOutcome::Transitioned(TransitionEvent::new(
            event_type, payload,
        )))
    }
}
