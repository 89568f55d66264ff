pub mod pull_requests;

pub use pull_requests::{GetPullRequest, GetUserPullRequests, PullRequestRepository, RegistryError};
