//! Webhook payload handlers.
//!
//! A [`PayloadHandler`] declares the event keys it understands, decodes the
//! raw body into a [`PullRequestPayload`] and applies the registry
//! transition for one event key. The [`EventClassifier`] picks handlers by
//! their declared keys, so adding a handler never touches the classifier.

pub mod classifier;
pub mod pull_request;

pub use classifier::{DispatchOutcome, EventClassifier, HandlerReport, HandlerStatus};
pub use pull_request::PullRequestHandler;

use crate::bitbucket::{DecodeError, PullRequestPayload};
use crate::entities::RegistryError;
use crate::events::TransitionEvent;
use async_trait::async_trait;
use thiserror::Error;

/// Errors a handler transition can fail with.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result of a handler run that did not fail.
#[derive(Debug)]
pub enum HandleOutcome {
    /// The registry changed; the event should be published.
    Transitioned(TransitionEvent),
    /// The handler has no transition for this event key. The payload is
    /// passed back untouched.
    Unhandled(PullRequestPayload),
}

#[async_trait]
pub trait PayloadHandler: Send + Sync {
    /// Short name used in logs and dispatch reports.
    fn name(&self) -> &'static str;

    /// Event keys this handler accepts.
    fn supported_events(&self) -> &[&'static str];

    fn supports(&self, event_type: &str) -> bool {
        self.supported_events().contains(&event_type)
    }

    /// Decode a raw webhook body. Must not touch shared state.
    fn prepare_body(&self, raw_body: &str) -> Result<PullRequestPayload, DecodeError>;

    /// Apply the transition for `event_type`.
    async fn handle_payload(
        &self,
        event_type: &str,
        payload: PullRequestPayload,
    ) -> Result<HandleOutcome, HandlerError>;
}
