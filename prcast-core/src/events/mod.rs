//! Event system.
//!
//! # Event Flow
//!
//! 1. `EventClassifier` decodes a webhook and runs the matching handlers
//! 2. Each successful handler run publishes a `TransitionEvent` on the
//!    `TransitionBus` under `webhook:<event key>`
//! 3. `Notifier` (subscribed to every pull request event name) pushes
//!    personalized notifications to the affected users
//!
//! `ResyncRequest` is separate: it asks `BitbucketSync` to reload open pull
//! requests from the REST API.

pub mod bus;
pub mod channels;
pub mod types;

pub use bus::{EventBus, PublishHandle, Subscriber, SubscriberError, TransitionBus};
pub use channels::{DEFAULT_CHANNEL_BUFFER, ResyncReceiver, ResyncSender, resync_channel};
pub use types::{
    PullRequestEvent, ResyncRequest, Transition, TransitionEvent, UnsupportedEvent,
    WEBHOOK_NAMESPACE, bus_event_name,
};
