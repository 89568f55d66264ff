//! BitbucketSync processor.
//!
//! The BitbucketSync is responsible for:
//! - Receiving `ResyncRequest` events (startup, SIGHUP)
//! - Reading the current `[bitbucket]` configuration
//! - Running the fetcher and upserting the results into the registry

use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tracing::{debug, info};

use crate::bitbucket::{BitbucketFetcher, FetchSummary};
use crate::config::BitbucketConfig;
use crate::entities::PullRequestRepository;
use crate::events::{ResyncReceiver, ResyncRequest};

/// Loads open pull requests whenever a resync is requested.
pub struct BitbucketSync {
    registry: PullRequestRepository,
    config: Arc<RwLock<Option<BitbucketConfig>>>,
    resync_rx: ResyncReceiver,
    shutdown_rx: watch::Receiver<bool>,
}

impl BitbucketSync {
    /// Create a new BitbucketSync.
    ///
    /// # Arguments
    ///
    /// * `registry` - The pull request registry to fill
    /// * `config` - Shared `[bitbucket]` section, swapped on reload
    /// * `resync_rx` - Receiver for ResyncRequest events
    /// * `shutdown_rx` - Receiver for shutdown signal
    pub fn new(
        registry: PullRequestRepository,
        config: Arc<RwLock<Option<BitbucketConfig>>>,
        resync_rx: ResyncReceiver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            config,
            resync_rx,
            shutdown_rx,
        }
    }

    /// Run the BitbucketSync.
    pub async fn run(mut self) {
        info!("BitbucketSync started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("BitbucketSync received shutdown signal");
                        break;
                    }
                }

                request = self.resync_rx.recv() => match request {
                    Some(request) => {
                        debug!(request = ?request, "Received ResyncRequest");
                        self.sync_once(request).await;
                    }
                    None => {
                        info!("ResyncRequest channel closed");
                        break;
                    }
                },
            }
        }

        info!("BitbucketSync shutdown complete");
    }

    /// Fetch once with the current configuration.
    ///
    /// Returns `None` when no `[bitbucket]` section is configured.
    pub async fn sync_once(&self, request: ResyncRequest) -> Option<FetchSummary> {
        let fetcher = match self.config.read().await.as_ref() {
            Some(config) => BitbucketFetcher::new(config),
            None => {
                debug!(request = ?request, "No Bitbucket configuration, skipping resync");
                return None;
            }
        };

        let summary = fetcher.init_pull_request_collection(&self.registry).await;
        info!(
            request = ?request,
            pull_requests = summary.pull_requests,
            failed = summary.failed.len(),
            "Resync finished"
        );
        Some(summary)
    }
}
