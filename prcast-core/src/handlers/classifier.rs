//! Routes inbound webhooks to the handlers that understand them.
//!
//! Every handler whose supported events contain the event key runs
//! concurrently; the dispatch waits for all of them and reports each one
//! separately, so a decode error or missing entry in one handler never
//! stops a sibling.

use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::{HandleOutcome, HandlerError, PayloadHandler};
use crate::entities::RegistryError;
use crate::events::{PublishHandle, TransitionBus};

/// Dispatches webhooks to registered [`PayloadHandler`]s and publishes the
/// resulting transitions.
pub struct EventClassifier {
    handlers: Vec<Arc<dyn PayloadHandler>>,
    bus: TransitionBus,
}

/// What happened to one handler during a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum HandlerStatus {
    /// The transition was applied and published.
    Published,
    /// Nothing to do (unknown pull request, unhandled event key).
    Skipped(String),
    /// Decoding or the transition failed.
    Failed(String),
}

/// Per-handler entry of a [`DispatchOutcome`].
#[derive(Debug, Serialize)]
pub struct HandlerReport {
    pub handler: &'static str,
    #[serde(flatten)]
    pub status: HandlerStatus,
    #[serde(skip)]
    publish: Option<PublishHandle>,
}

/// Result of [`EventClassifier::dispatch`].
///
/// Serialized as the webhook endpoint's response body.
#[derive(Debug, Serialize)]
pub struct DispatchOutcome {
    pub event_type: String,
    pub handlers: Vec<HandlerReport>,
}

impl DispatchOutcome {
    pub fn published(&self) -> usize {
        self.handlers
            .iter()
            .filter(|h| h.status == HandlerStatus::Published)
            .count()
    }

    /// Wait until every subscriber of the published events has finished.
    pub async fn settled(mut self) -> Self {
        for report in &mut self.handlers {
            if let Some(publish) = report.publish.take() {
                publish.join().await;
            }
        }
        self
    }
}

impl EventClassifier {
    pub fn new(bus: TransitionBus) -> Self {
        Self {
            handlers: Vec::new(),
            bus,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn PayloadHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn register(&mut self, handler: Arc<dyn PayloadHandler>) {
        debug!(
            handler = handler.name(),
            events = ?handler.supported_events(),
            "Registering webhook handler"
        );
        self.handlers.push(handler);
    }

    /// Handlers that accept `event_type`, in registration order.
    pub fn matching(&self, event_type: &str) -> Vec<Arc<dyn PayloadHandler>> {
        self.handlers
            .iter()
            .filter(|h| h.supports(event_type))
            .cloned()
            .collect()
    }

    /// Run every matching handler for one webhook delivery.
    ///
    /// Unknown event keys match no handler and complete with an empty
    /// report.
    #[tracing::instrument(skip(self, raw_body), fields(body_len = raw_body.len()))]
    pub async fn dispatch(&self, event_type: &str, raw_body: &str) -> DispatchOutcome {
        let handlers = self.matching(event_type);
        if handlers.is_empty() {
            debug!("No handler for webhook event, ignoring");
        }

        let handlers = join_all(
            handlers
                .iter()
                .map(|handler| self.run_handler(handler.as_ref(), event_type, raw_body)),
        )
        .await;

        DispatchOutcome {
            event_type: event_type.to_string(),
            handlers,
        }
    }

    async fn run_handler(
        &self,
        handler: &dyn PayloadHandler,
        event_type: &str,
        raw_body: &str,
    ) -> HandlerReport {
        let name = handler.name();
        let report = |status| HandlerReport {
            handler: name,
            status,
            publish: None,
        };

        let payload = match handler.prepare_body(raw_body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(handler = name, error = %e, "Failed to decode webhook body");
                return report(HandlerStatus::Failed(e.to_string()));
            }
        };

        match handler.handle_payload(event_type, payload).await {
            Ok(HandleOutcome::Transitioned(event)) => {
                let publish = self.bus.publish(&event.bus_name(), event).await;
                HandlerReport {
                    handler: name,
                    status: HandlerStatus::Published,
                    publish: Some(publish),
                }
            }
            Ok(HandleOutcome::Unhandled(_)) => report(HandlerStatus::Skipped(format!(
                "unhandled event type {event_type}"
            ))),
            Err(HandlerError::Registry(e @ RegistryError::NotFound(_))) => {
                info!(handler = name, error = %e, "Ignoring webhook for unknown pull request");
                report(HandlerStatus::Skipped(e.to_string()))
            }
            Err(e) => {
                error!(handler = name, error = %e, "Webhook handler failed");
                report(HandlerStatus::Failed(e.to_string()))
            }
        }
    }
}
