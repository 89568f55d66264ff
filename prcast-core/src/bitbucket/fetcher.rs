//! Loads the open pull requests of the configured repositories from the
//! Bitbucket REST API.
//!
//! Webhooks only describe changes, so without this initial load a freshly
//! started relay would not know about pull requests opened before it.

use futures_util::future::join_all;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::payload::{DecodeError, RawPullRequest, decode_pull_request};
use crate::config::{BitbucketConfig, BitbucketCredentials};
use crate::entities::PullRequestRepository;
use prcast_sdk::objects::PullRequest;

/// Errors that can occur while fetching from Bitbucket.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
}

/// One page of a paginated Bitbucket collection.
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

/// The list endpoint omits participants, so only the id is taken from it.
#[derive(Debug, Deserialize)]
struct PullRequestSummary {
    id: u64,
}

/// Result of [`BitbucketFetcher::init_pull_request_collection`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Pull requests stored in the registry.
    pub pull_requests: usize,
    /// Repositories that could not be loaded.
    pub failed: Vec<String>,
}

/// Bitbucket REST client for the initial pull request collection.
pub struct BitbucketFetcher {
    http_client: reqwest::Client,
    api_url: String,
    credentials: Option<BitbucketCredentials>,
    repositories: Vec<String>,
}

impl BitbucketFetcher {
    pub fn new(config: &BitbucketConfig) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            api_url: config.api_url.as_str().trim_end_matches('/').to_string(),
            credentials: config.credentials.clone(),
            repositories: config.repositories.clone(),
        }
    }

    /// Fetch every open pull request of every configured repository and
    /// upsert it into `registry`.
    ///
    /// A failing repository is logged and reported in the summary; the
    /// others are still loaded.
    #[tracing::instrument(skip_all, name = "BitbucketFetcher:init")]
    pub async fn init_pull_request_collection(
        &self,
        registry: &PullRequestRepository,
    ) -> FetchSummary {
        info!(repositories = self.repositories.len(), "Initializing pull requests");

        let results = join_all(
            self.repositories
                .iter()
                .map(|repository| self.fetch_open_pull_requests(repository)),
        )
        .await;

        let mut summary = FetchSummary::default();
        for (repository, result) in self.repositories.iter().zip(results) {
            match result {
                Ok(pull_requests) => {
                    debug!(%repository, count = pull_requests.len(), "Fetched open pull requests");
                    for pr in pull_requests {
                        registry.upsert(pr).await;
                        summary.pull_requests += 1;
                    }
                }
                Err(e) => {
                    error!(%repository, error = %e, "Failed to fetch pull requests");
                    summary.failed.push(repository.clone());
                }
            }
        }

        info!("{} pull requests initialized", summary.pull_requests);
        summary
    }

    /// Fetch all open pull requests of one repository, with participants.
    pub async fn fetch_open_pull_requests(
        &self,
        repository: &str,
    ) -> Result<Vec<PullRequest>, FetchError> {
        let mut ids = Vec::new();
        let mut next = Some(format!(
            "{}/repositories/{}/pullrequests?state=OPEN",
            self.api_url, repository
        ));
        while let Some(url) = next {
            let page: Page<PullRequestSummary> = self.get_json(&url).await?;
            ids.extend(page.values.into_iter().map(|summary| summary.id));
            next = page.next;
        }

        let details = join_all(ids.iter().map(|id| self.fetch_pull_request(repository, *id))).await;

        let mut pull_requests = Vec::with_capacity(details.len());
        for (id, detail) in ids.into_iter().zip(details) {
            match detail {
                Ok(pr) => pull_requests.push(pr),
                Err(e) => warn!(%repository, id, error = %e, "Skipping pull request"),
            }
        }
        Ok(pull_requests)
    }

    pub async fn fetch_pull_request(
        &self,
        repository: &str,
        id: u64,
    ) -> Result<PullRequest, FetchError> {
        let url = format!("{}/repositories/{}/pullrequests/{}", self.api_url, repository, id);
        let raw: RawPullRequest = self.get_json(&url).await?;
        Ok(decode_pull_request(raw)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let mut request = self.http_client.get(url);
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.app_password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Api {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
