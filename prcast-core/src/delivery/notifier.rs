//! Decides who is notified about what, and pushes personalized views.

use async_trait::async_trait;
use compact_str::CompactString;
use kanau::processor::Processor;
use prcast_sdk::objects::{
    INTRODUCE_EVENT, NotificationPayload, PullRequest, PullRequestRef, ServerMessage, User,
    UserPullRequests,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::channels::{ChannelRegistry, ConnectionId, DeliverySender};
use crate::entities::{GetUserPullRequests, PullRequestRepository};
use crate::events::{PullRequestEvent, Subscriber, SubscriberError, TransitionBus, TransitionEvent};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("pull request {0} not found")]
    NotFound(PullRequestRef),
}

/// Pushes introduction snapshots, reminders and transition updates.
#[derive(Clone)]
pub struct Notifier {
    registry: PullRequestRepository,
    channels: ChannelRegistry,
}

impl Notifier {
    pub fn new(registry: PullRequestRepository, channels: ChannelRegistry) -> Self {
        Self { registry, channels }
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Subscribe to every pull request event name on `bus`.
    pub async fn subscribe_to(&self, bus: &TransitionBus) {
        let subscriber: Arc<dyn Subscriber<TransitionEvent>> = Arc::new(self.clone());
        for event in PullRequestEvent::ALL {
            bus.subscribe(event.bus_name(), subscriber.clone()).await;
        }
    }

    async fn view_of(&self, username: &str) -> UserPullRequests {
        let query = GetUserPullRequests {
            username: CompactString::from(username),
        };
        match self.registry.process(query).await {
            Ok(view) => view,
            Err(never) => match never {},
        }
    }

    /// Bind `connection` to `username` and send the user's current view to
    /// all of the user's connections.
    ///
    /// Returns how many connections received the snapshot.
    #[tracing::instrument(skip(self, sender))]
    pub async fn introduce(
        &self,
        username: &str,
        connection: ConnectionId,
        sender: DeliverySender,
    ) -> usize {
        if !self.channels.register(username, connection, sender).await {
            debug!("Delivery closed, ignoring introduction");
            return 0;
        }

        let pull_requests = self.view_of(username).await;
        info!(
            authored = pull_requests.authored.len(),
            assigned = pull_requests.assigned.len(),
            "Client introduced"
        );
        let message = ServerMessage::Introduced(NotificationPayload {
            event_type: INTRODUCE_EVENT.to_string(),
            actor: Some(User::new(username)),
            pull_request: None,
            pull_requests,
        });
        self.channels.push(username, message).await
    }

    /// Remind every reviewer of `key` who has not approved yet.
    ///
    /// Returns how many connections received a reminder.
    #[tracing::instrument(skip(self), fields(pull_request = %key))]
    pub async fn remind(&self, key: &PullRequestRef) -> Result<usize, NotifyError> {
        let pr = self
            .registry
            .find_by_identifier(key)
            .await
            .ok_or_else(|| NotifyError::NotFound(key.clone()))?;

        let mut delivered = 0;
        for reviewer in pr.pending_reviewers() {
            delivered += self
                .channels
                .push(&reviewer.user.username, ServerMessage::Remind(key.clone()))
                .await;
        }
        info!(delivered, "Reminded pending reviewers");
        Ok(delivered)
    }

    /// Push each author or reviewer of the changed pull request their
    /// recomputed view.
    ///
    /// Returns how many connections received an update.
    #[tracing::instrument(skip_all, fields(event_type = %event.event_type, pull_request = %event.pull_request.key()))]
    pub async fn notify_transition(&self, event: &TransitionEvent) -> usize {
        let event_type = event.bus_name();
        let mut delivered = 0;
        for username in recipients(&event.pull_request) {
            if !self.channels.is_connected(&username).await {
                continue;
            }
            let message = ServerMessage::PullRequestsUpdated(NotificationPayload {
                event_type: event_type.clone(),
                actor: event.actor.clone(),
                pull_request: Some(event.pull_request.clone()),
                pull_requests: self.view_of(&username).await,
            });
            delivered += self.channels.push(&username, message).await;
        }
        debug!(delivered, "Transition delivered");
        delivered
    }
}

/// Author first, then reviewers in order, without repeats.
fn recipients(pr: &PullRequest) -> Vec<CompactString> {
    let mut recipients = vec![pr.author.username.clone()];
    for reviewer in &pr.reviewers {
        if !recipients.contains(&reviewer.user.username) {
            recipients.push(reviewer.user.username.clone());
        }
    }
    recipients
}

#[async_trait]
impl Subscriber<TransitionEvent> for Notifier {
    async fn handle(&self, event: TransitionEvent) -> Result<(), SubscriberError> {
        self.notify_transition(&event).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryReceiver, connection_channel};
    use crate::entities::pull_requests::tests::pull_request;
    use crate::events::EventBus;
    use uuid::Uuid;

    fn setup() -> (Notifier, PullRequestRepository) {
        let registry = PullRequestRepository::new();
        let notifier = Notifier::new(registry.clone(), ChannelRegistry::new());
        (notifier, registry)
    }

    async fn connect(notifier: &Notifier, username: &str) -> DeliveryReceiver {
        let (tx, mut rx) = connection_channel(16);
        notifier.introduce(username, Uuid::new_v4(), tx).await;
        // Drop the introduction snapshot.
        rx.try_recv().unwrap();
        rx
    }

    fn ids(prs: &[PullRequest]) -> Vec<u64> {
        prs.iter().map(|p| p.id).collect()
    }

    fn payload(message: ServerMessage) -> NotificationPayload {
        match message {
            ServerMessage::Introduced(p) | ServerMessage::PullRequestsUpdated(p) => p,
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_introduction_snapshot_is_authored_or_reviewing_set() {
        let (notifier, registry) = setup();
        registry.insert(pull_request(1, "carol", &[("dave", false)])).await.unwrap();
        registry.insert(pull_request(2, "dave", &[("carol", true)])).await.unwrap();
        registry.insert(pull_request(3, "erin", &[("frank", false)])).await.unwrap();

        let (tx, mut rx) = connection_channel(16);
        assert_eq!(notifier.introduce("carol", Uuid::new_v4(), tx).await, 1);

        let message = rx.try_recv().unwrap();
        assert!(matches!(message, ServerMessage::Introduced(_)));
        let snapshot = payload(message);
        assert_eq!(snapshot.event_type, INTRODUCE_EVENT);
        assert_eq!(ids(&snapshot.pull_requests.authored), vec![1]);
        assert_eq!(ids(&snapshot.pull_requests.assigned), vec![2]);
    }

    #[tokio::test]
    async fn test_introduction_reaches_whole_group() {
        let (notifier, registry) = setup();
        registry.insert(pull_request(1, "carol", &[])).await.unwrap();
        let mut first = connect(&notifier, "carol").await;

        let (tx, mut second) = connection_channel(16);
        assert_eq!(notifier.introduce("carol", Uuid::new_v4(), tx).await, 2);
        assert!(matches!(first.try_recv().unwrap(), ServerMessage::Introduced(_)));
        assert!(matches!(second.try_recv().unwrap(), ServerMessage::Introduced(_)));
    }

    #[tokio::test]
    async fn test_remind_reaches_pending_reviewers_only() {
        let (notifier, registry) = setup();
        registry
            .insert(pull_request(7, "carol", &[("alice", true), ("bob", false)]))
            .await
            .unwrap();
        let mut alice = connect(&notifier, "alice").await;
        let mut bob = connect(&notifier, "bob").await;
        let mut carol = connect(&notifier, "carol").await;

        let key = PullRequestRef::new("team/app", 7);
        assert_eq!(notifier.remind(&key).await, Ok(1));

        assert_eq!(bob.try_recv().unwrap(), ServerMessage::Remind(key));
        assert!(alice.try_recv().is_err());
        assert!(carol.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remind_with_all_approvals_sends_nothing() {
        let (notifier, registry) = setup();
        registry
            .insert(pull_request(8, "carol", &[("alice", true), ("bob", true)]))
            .await
            .unwrap();
        let mut alice = connect(&notifier, "alice").await;
        let mut bob = connect(&notifier, "bob").await;

        assert_eq!(notifier.remind(&PullRequestRef::new("team/app", 8)).await, Ok(0));
        assert!(alice.try_recv().is_err());
        assert!(bob.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remind_unknown_pull_request() {
        let (notifier, _registry) = setup();
        let key = PullRequestRef::new("team/app", 404);
        assert_eq!(notifier.remind(&key).await, Err(NotifyError::NotFound(key)));
    }

    #[tokio::test]
    async fn test_transition_sends_three_personalized_pushes() {
        let (notifier, registry) = setup();
        let pr = pull_request(1, "carol", &[("dave", false), ("erin", false)]);
        registry.insert(pr.clone()).await.unwrap();
        registry.insert(pull_request(2, "dave", &[])).await.unwrap();
        let mut carol = connect(&notifier, "carol").await;
        let mut dave = connect(&notifier, "dave").await;
        let mut erin = connect(&notifier, "erin").await;
        let mut frank = connect(&notifier, "frank").await;

        let event = TransitionEvent {
            event_type: "pullrequest:updated".to_string(),
            pull_request: pr,
            actor: Some(User::new("dave")),
        };
        assert_eq!(notifier.notify_transition(&event).await, 3);

        let carol_view = payload(carol.try_recv().unwrap());
        let dave_view = payload(dave.try_recv().unwrap());
        let erin_view = payload(erin.try_recv().unwrap());
        assert!(frank.try_recv().is_err());

        assert_eq!(carol_view.event_type, "webhook:pullrequest:updated");
        assert_eq!(carol_view.pull_request.as_ref().map(|p| p.id), Some(1));
        assert_eq!(ids(&carol_view.pull_requests.authored), vec![1]);
        assert_eq!(ids(&dave_view.pull_requests.authored), vec![2]);
        assert_eq!(ids(&dave_view.pull_requests.assigned), vec![1]);
        assert!(erin_view.pull_requests.authored.is_empty());
        assert_eq!(ids(&erin_view.pull_requests.assigned), vec![1]);

        assert!(carol.try_recv().is_err());
        assert!(dave.try_recv().is_err());
        assert!(erin.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_channel_does_not_stop_fan_out() {
        let (notifier, registry) = setup();
        let pr = pull_request(1, "carol", &[("dave", false), ("erin", false)]);
        registry.insert(pr.clone()).await.unwrap();
        let mut carol = connect(&notifier, "carol").await;
        let dave = connect(&notifier, "dave").await;
        let mut erin = connect(&notifier, "erin").await;
        drop(dave);

        let event = TransitionEvent {
            event_type: "pullrequest:approved".to_string(),
            pull_request: pr,
            actor: None,
        };
        assert_eq!(notifier.notify_transition(&event).await, 2);
        assert!(carol.try_recv().is_ok());
        assert!(erin.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_closed_pull_request_leaves_recipient_views() {
        let (notifier, registry) = setup();
        let pr = pull_request(1, "carol", &[("dave", true)]);
        registry.insert(pr.clone()).await.unwrap();
        let bus: TransitionBus = EventBus::new();
        notifier.subscribe_to(&bus).await;
        let mut dave = connect(&notifier, "dave").await;

        registry.remove(&pr.key()).await.unwrap();
        let event = TransitionEvent {
            event_type: "pullrequest:fulfilled".to_string(),
            pull_request: pr,
            actor: Some(User::new("carol")),
        };
        bus.publish(&event.bus_name(), event).await.join().await;

        let view = payload(dave.try_recv().unwrap());
        assert_eq!(view.event_type, "webhook:pullrequest:fulfilled");
        assert!(view.pull_requests.is_empty());
    }
}
