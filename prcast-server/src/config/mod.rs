//! Configuration module for prcast-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;
pub mod runtime;

use crate::config::file::{BitbucketConfig as FileBitbucketConfig, FileConfig};
use crate::config::runtime::{
    BitbucketConfig, BitbucketCredentials, DeliveryConfig, ServerConfig, SharedConfig,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Environment variable that overrides `bitbucket.app_password`.
pub const APP_PASSWORD_ENV: &str = "PRCAST_BITBUCKET_APP_PASSWORD";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Loaded configuration result containing all parts.
#[derive(Debug)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub delivery: DeliveryConfig,
    pub bitbucket: Option<BitbucketConfig>,
}

impl LoadedConfig {
    /// Convert into a SharedConfig; only the Bitbucket section is reloadable.
    pub fn into_shared(self) -> SharedConfig {
        SharedConfig {
            server: Arc::new(self.server),
            delivery: Arc::new(self.delivery),
            bitbucket: Arc::new(RwLock::new(self.bitbucket)),
        }
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI and environment overrides
    /// 3. Validate the configuration
    /// 4. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content, std::env::var(APP_PASSWORD_ENV).ok())
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn load_str(
        &self,
        content: &str,
        app_password: Option<String>,
    ) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }
        if let (Some(bitbucket), Some(password)) = (file_config.bitbucket.as_mut(), app_password) {
            bitbucket.app_password = Some(password);
        }

        self.validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.delivery.channel_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "delivery.channel_buffer must be greater than zero".to_string(),
            ));
        }

        let Some(bitbucket) = &config.bitbucket else {
            return Ok(());
        };
        if !matches!(bitbucket.api_url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "bitbucket.api_url must be http or https, got {}",
                bitbucket.api_url
            )));
        }
        if bitbucket.username.is_some() != bitbucket.app_password.is_some() {
            return Err(ConfigError::ValidationError(
                "bitbucket.username and bitbucket.app_password must be set together".to_string(),
            ));
        }
        for repository in &bitbucket.repositories {
            let mut parts = repository.split('/');
            let valid = matches!(
                (parts.next(), parts.next(), parts.next()),
                (Some(workspace), Some(slug), None) if !workspace.is_empty() && !slug.is_empty()
            );
            if !valid {
                return Err(ConfigError::ValidationError(format!(
                    "repository {repository:?} is not of the form workspace/slug"
                )));
            }
        }
        Ok(())
    }
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        delivery: DeliveryConfig {
            channel_buffer: file_config.delivery.channel_buffer,
        },
        bitbucket: file_config.bitbucket.map(convert_bitbucket),
    }
}

fn convert_bitbucket(b: FileBitbucketConfig) -> BitbucketConfig {
    let credentials = match (b.username, b.app_password) {
        (Some(username), Some(app_password)) => Some(BitbucketCredentials {
            username,
            app_password,
        }),
        _ => None,
    };
    BitbucketConfig {
        api_url: b.api_url,
        credentials,
        repositories: b.repositories,
    }
}
