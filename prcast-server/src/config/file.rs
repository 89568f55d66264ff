//! TOML file configuration structures.
//!
//! These structs directly map to the `prcast.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Omit to start with an empty registry and rely on webhooks alone.
    #[serde(default)]
    pub bitbucket: Option<BitbucketConfig>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8765").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8765))
}

/// Delivery configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Messages buffered per WebSocket connection.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            channel_buffer: default_channel_buffer(),
        }
    }
}

fn default_channel_buffer() -> usize {
    prcast_core::events::DEFAULT_CHANNEL_BUFFER
}

/// Bitbucket REST API section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitbucketConfig {
    #[serde(default = "default_api_url")]
    pub api_url: Url,
    #[serde(default)]
    pub username: Option<String>,
    /// May also be supplied through `PRCAST_BITBUCKET_APP_PASSWORD`.
    #[serde(default)]
    pub app_password: Option<String>,
    /// Repositories to load at startup, as `workspace/slug`.
    #[serde(default)]
    pub repositories: Vec<String>,
}

/// Bitbucket Cloud REST API root.
pub const DEFAULT_API_URL: &str = "https://api.bitbucket.org/2.0";

fn default_api_url() -> Url {
    Url::parse(DEFAULT_API_URL).expect("valid default API URL")
}
