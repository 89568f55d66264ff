//! Bitbucket REST API configuration.

use url::Url;

/// Basic-auth credentials (username + app password).
#[derive(Clone)]
pub struct BitbucketCredentials {
    pub username: String,
    pub app_password: String,
}

impl std::fmt::Debug for BitbucketCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitbucketCredentials")
            .field("username", &self.username)
            .field("app_password", &"<redacted>")
            .finish()
    }
}

/// Where to fetch the initial pull request collection from.
#[derive(Debug, Clone)]
pub struct BitbucketConfig {
    /// API root, e.g. `https://api.bitbucket.org/2.0`.
    pub api_url: Url,
    pub credentials: Option<BitbucketCredentials>,
    /// Repositories to load, as `workspace/slug`.
    pub repositories: Vec<String>,
}
