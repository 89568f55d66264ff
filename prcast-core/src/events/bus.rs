//! Named publish/subscribe hub.
//!
//! Subscribers register for an exact event name. `publish` spawns one task
//! per subscriber and returns straight away; subscriber failures are logged
//! and never reach the publisher.
//!
//! The process builds one bus at startup and hands clones to the
//! components that publish or subscribe.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::types::TransitionEvent;

/// Error type subscribers may return.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Receives events published under the names it was subscribed to.
#[async_trait]
pub trait Subscriber<T>: Send + Sync {
    async fn handle(&self, event: T) -> Result<(), SubscriberError>;
}

type SubscriberList<T> = Vec<Arc<dyn Subscriber<T>>>;

/// Cloneable handle to a shared subscriber table.
pub struct EventBus<T> {
    subscribers: Arc<RwLock<HashMap<String, SubscriberList<T>>>>,
}

/// The bus carrying registry transitions.
pub type TransitionBus = EventBus<TransitionEvent>;

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscriber` for events named exactly `name`.
    pub async fn subscribe(&self, name: impl Into<String>, subscriber: Arc<dyn Subscriber<T>>) {
        let name = name.into();
        debug!(event = %name, "Subscribing to bus event");
        self.subscribers
            .write()
            .await
            .entry(name)
            .or_default()
            .push(subscriber);
    }

    /// Deliver `payload` to every subscriber of `name`.
    ///
    /// Subscribers are spawned in registration order. Dropping the returned
    /// handle detaches them; awaiting [`PublishHandle::join`] waits for all
    /// of them to finish.
    pub async fn publish(&self, name: &str, payload: T) -> PublishHandle {
        let subscribers: SubscriberList<T> = self
            .subscribers
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default();

        debug!(event = %name, subscribers = subscribers.len(), "Publishing bus event");

        let tasks = subscribers
            .into_iter()
            .enumerate()
            .map(|(index, subscriber)| {
                let event = payload.clone();
                let name = name.to_owned();
                tokio::spawn(async move {
                    if let Err(e) = subscriber.handle(event).await {
                        error!(event = %name, subscriber = index, error = %e, "Bus subscriber failed");
                    }
                })
            })
            .collect();

        PublishHandle {
            event: name.to_owned(),
            tasks,
        }
    }

    pub async fn subscriber_count(&self, name: &str) -> usize {
        self.subscribers
            .read()
            .await
            .get(name)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Drop every subscription.
    pub async fn clear(&self) {
        self.subscribers.write().await.clear();
    }
}

/// Tasks spawned by one [`EventBus::publish`] call.
#[derive(Debug)]
pub struct PublishHandle {
    event: String,
    tasks: Vec<JoinHandle<()>>,
}

impl PublishHandle {
    pub fn subscriber_count(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every subscriber task. Panics inside subscribers are logged.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(event = %self.event, error = %e, "Bus subscriber task aborted");
            }
        }
    }
}
