//! Runtime configuration types for prcast.
//!
//! These are the validated values the server hands to core components.
//! Loading and parsing the TOML file is handled by the server crate.

mod bitbucket;
mod delivery;

pub use bitbucket::{BitbucketConfig, BitbucketCredentials};
pub use delivery::DeliveryConfig;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address and port to listen on.
    pub listen: SocketAddr,
}

/// Shared configuration state.
///
/// Only the Bitbucket section is swapped on reload; the listener and
/// channel sizes are fixed for the lifetime of the process.
#[derive(Clone)]
pub struct SharedConfig {
    pub server: Arc<ServerConfig>,
    pub delivery: Arc<DeliveryConfig>,
    /// `None` when no `[bitbucket]` section is configured.
    pub bitbucket: Arc<RwLock<Option<BitbucketConfig>>>,
}
