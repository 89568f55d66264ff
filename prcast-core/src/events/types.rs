//! Event type definitions.
//!
//! Webhook event keys are kept as strings at the edges (they come from an
//! HTTP header and may be anything); [`PullRequestEvent`] is the closed set
//! this relay understands.

use crate::bitbucket::PullRequestPayload;
use prcast_sdk::objects::{PullRequest, User};
use std::str::FromStr;

/// Namespace prefixed to webhook event keys when they are re-published on
/// the internal bus.
pub const WEBHOOK_NAMESPACE: &str = "webhook";

/// Bus event name for a webhook event key, e.g. `webhook:pullrequest:created`.
pub fn bus_event_name(event_type: &str) -> String {
    format!("{WEBHOOK_NAMESPACE}:{event_type}")
}

/// Pull request webhook event keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PullRequestEvent {
    Created,
    Updated,
    Approved,
    Unapproved,
    Fulfilled,
    Rejected,
}

/// Registry effect of a pull request event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Create,
    Update,
    Close,
}

impl PullRequestEvent {
    pub const ALL: [PullRequestEvent; 6] = [
        PullRequestEvent::Created,
        PullRequestEvent::Updated,
        PullRequestEvent::Approved,
        PullRequestEvent::Unapproved,
        PullRequestEvent::Fulfilled,
        PullRequestEvent::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PullRequestEvent::Created => "pullrequest:created",
            PullRequestEvent::Updated => "pullrequest:updated",
            PullRequestEvent::Approved => "pullrequest:approved",
            PullRequestEvent::Unapproved => "pullrequest:unapproved",
            PullRequestEvent::Fulfilled => "pullrequest:fulfilled",
            PullRequestEvent::Rejected => "pullrequest:rejected",
        }
    }

    pub fn transition(&self) -> Transition {
        match self {
            PullRequestEvent::Created => Transition::Create,
            PullRequestEvent::Updated | PullRequestEvent::Approved | PullRequestEvent::Unapproved => {
                Transition::Update
            }
            PullRequestEvent::Fulfilled | PullRequestEvent::Rejected => Transition::Close,
        }
    }

    pub fn bus_name(&self) -> String {
        bus_event_name(self.as_str())
    }
}

impl std::fmt::Display for PullRequestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an event key is not a pull request event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported event type: {0}")]
pub struct UnsupportedEvent(pub String);

impl FromStr for PullRequestEvent {
    type Err = UnsupportedEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PullRequestEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnsupportedEvent(s.to_string()))
    }
}

/// A registry transition, published once per successful handler run.
#[derive(Debug, Clone)]
pub struct TransitionEvent {
    /// The webhook event key, without the bus namespace.
    pub event_type: String,
    /// Snapshot of the pull request after the transition.
    pub pull_request: PullRequest,
    pub actor: Option<User>,
}

impl TransitionEvent {
    pub fn new(event_type: impl Into<String>, payload: PullRequestPayload) -> Self {
        Self {
            event_type: event_type.into(),
            pull_request: payload.pull_request,
            actor: payload.actor,
        }
    }

    pub fn bus_name(&self) -> String {
        bus_event_name(&self.event_type)
    }
}

/// Asks `BitbucketSync` to reload open pull requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncRequest {
    /// Initial load when the server starts.
    Startup,
    /// The configuration was reloaded (SIGHUP).
    ConfigReloaded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_keys_and_transitions() {
        assert_eq!(
            "pullrequest:approved".parse::<PullRequestEvent>(),
            Ok(PullRequestEvent::Approved)
        );
        assert!("repo:push".parse::<PullRequestEvent>().is_err());

        let transitions: Vec<_> = PullRequestEvent::ALL.iter().map(|e| e.transition()).collect();
        assert_eq!(
            transitions,
            vec![
                Transition::Create,
                Transition::Update,
                Transition::Update,
                Transition::Update,
                Transition::Close,
                Transition::Close,
            ]
        );
        assert_eq!(PullRequestEvent::Rejected.bus_name(), "webhook:pullrequest:rejected");
    }
}
