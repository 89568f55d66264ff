//! Bitbucket integration: payload decoding and the REST fetcher.

pub mod fetcher;
pub mod payload;

pub use fetcher::{BitbucketFetcher, FetchError, FetchSummary};
pub use payload::{
    DecodeError, PullRequestPayload, RawPullRequest, decode_pull_request, decode_webhook,
};
