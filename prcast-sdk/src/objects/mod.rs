pub mod pull_request;
pub mod ws;

pub use pull_request::{
    PullRequest, PullRequestRef, PullRequestState, Repository, Reviewer, User, UserPullRequests,
};
pub use ws::{ClientMessage, INTRODUCE_EVENT, NotificationPayload, ServerMessage, WsCloseCode};
