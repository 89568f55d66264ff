//! Application state shared across all request handlers.

use crate::shutdown::ShutdownHandle;
use prcast_core::config::SharedConfig;
use prcast_core::delivery::{ChannelRegistry, Notifier};
use prcast_core::entities::PullRequestRepository;
use prcast_core::handlers::EventClassifier;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Runtime configuration (the Bitbucket section can be reloaded via SIGHUP).
    pub config: SharedConfig,
    pub registry: PullRequestRepository,
    pub classifier: Arc<EventClassifier>,
    pub notifier: Notifier,
    pub shutdown: ShutdownHandle,
}

impl AppState {
    pub fn new(
        config: SharedConfig,
        registry: PullRequestRepository,
        classifier: EventClassifier,
        notifier: Notifier,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            config,
            registry,
            classifier: Arc::new(classifier),
            notifier,
            shutdown,
        }
    }

    pub fn channels(&self) -> &ChannelRegistry {
        self.notifier.channels()
    }
}
