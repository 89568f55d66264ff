//! Decoding of Bitbucket pull request JSON into domain objects.
//!
//! The same shapes are used by webhook bodies (`{"pullrequest": {...},
//! "actor": {...}}`) and by the REST API's pull request detail endpoint, so
//! [`decode_pull_request`] serves both the webhook handlers and the fetcher.

use prcast_sdk::objects::{PullRequest, PullRequestState, Repository, Reviewer, User};
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Errors produced while decoding a Bitbucket payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("unknown pull request state: {0}")]
    UnknownState(String),

    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: time::error::Parse,
    },
}

/// A decoded pull request webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestPayload {
    pub pull_request: PullRequest,
    /// The user whose action triggered the webhook.
    pub actor: Option<User>,
    /// For approval events, the user who (un)approved.
    pub approval: Option<User>,
}

// ---------------------------------------------------------------------------
// Raw Bitbucket shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawWebhookBody {
    pullrequest: RawPullRequest,
    #[serde(default)]
    actor: Option<RawUser>,
    #[serde(default)]
    approval: Option<RawApproval>,
    #[serde(default)]
    repository: Option<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct RawApproval {
    user: RawUser,
}

/// A pull request as returned by Bitbucket.
#[derive(Debug, Deserialize)]
pub struct RawPullRequest {
    id: u64,
    title: String,
    #[serde(default)]
    description: Option<String>,
    author: RawUser,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    source: Option<RawEndpoint>,
    #[serde(default)]
    destination: Option<RawEndpoint>,
    #[serde(default)]
    reviewers: Vec<RawUser>,
    #[serde(default)]
    participants: Vec<RawParticipant>,
    #[serde(default)]
    links: Option<RawLinks>,
    #[serde(default)]
    created_on: Option<String>,
    #[serde(default)]
    updated_on: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEndpoint {
    #[serde(default)]
    branch: Option<RawBranch>,
    #[serde(default)]
    repository: Option<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct RawBranch {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRepository {
    full_name: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawParticipant {
    user: RawUser,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    approved: bool,
}

/// Bitbucket stopped sending `username` for most accounts, so the routing
/// key falls back to `nickname`, then `account_id`, then `uuid`.
#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    links: Option<RawLinks>,
}

#[derive(Debug, Deserialize)]
struct RawLinks {
    #[serde(default)]
    html: Option<RawHref>,
    #[serde(default)]
    avatar: Option<RawHref>,
}

#[derive(Debug, Deserialize)]
struct RawHref {
    href: String,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a raw webhook body.
pub fn decode_webhook(raw_body: &str) -> Result<PullRequestPayload, DecodeError> {
    let body: RawWebhookBody = serde_json::from_str(raw_body)?;
    let pull_request = convert_pull_request(body.pullrequest, body.repository)?;
    let actor = body.actor.map(|a| convert_user(a, "actor.username")).transpose()?;
    let approval = body
        .approval
        .map(|a| convert_user(a.user, "approval.user.username"))
        .transpose()?;

    Ok(PullRequestPayload {
        pull_request,
        actor,
        approval,
    })
}

/// Decode a pull request object on its own (REST API detail response).
pub fn decode_pull_request(raw: RawPullRequest) -> Result<PullRequest, DecodeError> {
    convert_pull_request(raw, None)
}

fn convert_pull_request(
    raw: RawPullRequest,
    fallback_repository: Option<RawRepository>,
) -> Result<PullRequest, DecodeError> {
    let destination = raw.destination;
    let repository = destination
        .as_ref()
        .and_then(|d| d.repository.clone())
        .or(fallback_repository)
        .ok_or(DecodeError::MissingField("destination.repository"))?;

    let reviewers = convert_reviewers(raw.reviewers, raw.participants)?;

    Ok(PullRequest {
        id: raw.id,
        title: raw.title,
        description: raw.description.unwrap_or_default(),
        author: convert_user(raw.author, "author.username")?,
        reviewers,
        state: convert_state(raw.state.as_deref())?,
        repository: Repository {
            name: repository.name.unwrap_or_else(|| {
                repository
                    .full_name
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string()
            }),
            full_name: repository.full_name,
        },
        source_branch: raw.source.and_then(|s| s.branch).map(|b| b.name),
        destination_branch: destination.and_then(|d| d.branch).map(|b| b.name),
        link: raw.links.and_then(|l| l.html).map(|h| h.href),
        created_on: parse_timestamp(raw.created_on)?,
        updated_on: parse_timestamp(raw.updated_on)?,
    })
}

/// Merge the `reviewers` list with the approval flags carried by
/// `participants`.
///
/// Order follows `reviewers`; participants with the `REVIEWER` role that are
/// missing from that list are appended.
fn convert_reviewers(
    reviewers: Vec<RawUser>,
    participants: Vec<RawParticipant>,
) -> Result<Vec<Reviewer>, DecodeError> {
    let mut approvals = Vec::with_capacity(participants.len());
    for participant in participants {
        let is_reviewer = participant.role.as_deref() == Some("REVIEWER");
        let user = convert_user(participant.user, "participants.user.username")?;
        approvals.push((user, participant.approved, is_reviewer));
    }

    let mut merged: Vec<Reviewer> = Vec::with_capacity(reviewers.len());
    for raw in reviewers {
        let user = convert_user(raw, "reviewers.username")?;
        if merged.iter().any(|r| r.user == user) {
            continue;
        }
        let approved = approvals
            .iter()
            .any(|(u, approved, _)| *u == user && *approved);
        merged.push(Reviewer::new(user, approved));
    }
    for (user, approved, is_reviewer) in approvals {
        if is_reviewer && !merged.iter().any(|r| r.user == user) {
            merged.push(Reviewer::new(user, approved));
        }
    }
    Ok(merged)
}

fn convert_user(raw: RawUser, field: &'static str) -> Result<User, DecodeError> {
    let username = [raw.username, raw.nickname, raw.account_id, raw.uuid]
        .into_iter()
        .flatten()
        .find(|name| !name.is_empty())
        .ok_or(DecodeError::MissingField(field))?;

    Ok(User {
        username: username.into(),
        display_name: raw.display_name,
        avatar_url: raw.links.and_then(|l| l.avatar).map(|a| a.href),
    })
}

fn convert_state(state: Option<&str>) -> Result<PullRequestState, DecodeError> {
    match state {
        None | Some("OPEN") => Ok(PullRequestState::Open),
        Some("MERGED") => Ok(PullRequestState::Merged),
        Some("DECLINED") => Ok(PullRequestState::Declined),
        Some("SUPERSEDED") => Ok(PullRequestState::Superseded),
        Some(other) => Err(DecodeError::UnknownState(other.to_string())),
    }
}

fn parse_timestamp(value: Option<String>) -> Result<Option<OffsetDateTime>, DecodeError> {
    value
        .map(|value| {
            OffsetDateTime::parse(&value, &Rfc3339)
                .map_err(|source| DecodeError::Timestamp { value, source })
        })
        .transpose()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// A trimmed-down Bitbucket `pullrequest:*` webhook body.
    pub(crate) fn webhook_body(id: u64, author: &str, reviewers: &[(&str, bool)]) -> String {
        let participants: Vec<_> = reviewers
            .iter()
            .map(|(name, approved)| {
                json!({
                    "user": {"nickname": name, "display_name": name.to_uppercase()},
                    "role": "REVIEWER",
                    "approved": approved,
                })
            })
            .collect();
        let reviewer_users: Vec<_> = reviewers
            .iter()
            .map(|(name, _)| json!({"nickname": name}))
            .collect();

        json!({
            "actor": {"nickname": author},
            "pullrequest": {
                "id": id,
                "title": format!("Pull request {id}"),
                "description": "",
                "state": "OPEN",
                "author": {"nickname": author, "display_name": author.to_uppercase()},
                "source": {"branch": {"name": format!("feature/{id}")}},
                "destination": {
                    "branch": {"name": "main"},
                    "repository": {"full_name": "team/app", "name": "app"}
                },
                "reviewers": reviewer_users,
                "participants": participants,
                "links": {"html": {"href": format!("https://bitbucket.org/team/app/pull-requests/{id}")}},
                "created_on": "2024-03-01T10:00:00.123456+00:00",
                "updated_on": "2024-03-01T11:30:00+00:00"
            },
            "repository": {"full_name": "team/app", "name": "app"}
        })
        .to_string()
    }

    #[test]
    fn test_decode_webhook_body() {
        let payload = decode_webhook(&webhook_body(42, "carol", &[("dave", true), ("erin", false)]))
            .unwrap();
        let pr = payload.pull_request;

        assert_eq!(pr.id, 42);
        assert_eq!(pr.author.username, "carol");
        assert_eq!(pr.author.display_name.as_deref(), Some("CAROL"));
        assert_eq!(pr.repository.full_name, "team/app");
        assert_eq!(pr.source_branch.as_deref(), Some("feature/42"));
        assert_eq!(pr.destination_branch.as_deref(), Some("main"));
        assert_eq!(pr.state, PullRequestState::Open);
        assert!(pr.created_on.is_some());

        let reviewers: Vec<_> = pr
            .reviewers
            .iter()
            .map(|r| (r.user.username.as_str(), r.approved))
            .collect();
        assert_eq!(reviewers, vec![("dave", true), ("erin", false)]);
        assert_eq!(payload.actor.map(|a| a.username.to_string()), Some("carol".to_string()));
        assert!(payload.approval.is_none());
    }

    #[test]
    fn test_participants_without_reviewer_role_are_ignored() {
        let body = json!({
            "pullrequest": {
                "id": 1,
                "title": "t",
                "author": {"username": "carol"},
                "destination": {"repository": {"full_name": "team/app"}},
                "participants": [
                    {"user": {"username": "dave"}, "role": "PARTICIPANT", "approved": true},
                    {"user": {"username": "erin"}, "role": "REVIEWER", "approved": true}
                ]
            },
            "approval": {"user": {"username": "erin"}}
        });
        let payload = decode_webhook(&body.to_string()).unwrap();
        let pr = payload.pull_request;

        assert_eq!(pr.reviewers, vec![Reviewer::new(User::new("erin"), true)]);
        assert_eq!(pr.repository.name, "app");
        assert_eq!(payload.approval, Some(User::new("erin")));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode_webhook("not json"), Err(DecodeError::Json(_))));

        let no_author = json!({
            "pullrequest": {
                "id": 1,
                "title": "t",
                "author": {"display_name": "Ghost"},
                "destination": {"repository": {"full_name": "team/app"}}
            }
        });
        assert!(matches!(
            decode_webhook(&no_author.to_string()),
            Err(DecodeError::MissingField("author.username"))
        ));

        let bad_state = json!({
            "pullrequest": {
                "id": 1,
                "title": "t",
                "state": "HALF_MERGED",
                "author": {"username": "carol"},
                "destination": {"repository": {"full_name": "team/app"}}
            }
        });
        assert!(matches!(
            decode_webhook(&bad_state.to_string()),
            Err(DecodeError::UnknownState(_))
        ));
    }

    #[test]
    fn test_repository_falls_back_to_webhook_repository() {
        let body = json!({
            "pullrequest": {"id": 3, "title": "t", "author": {"username": "carol"}},
            "repository": {"full_name": "team/app", "name": "app"}
        });
        let payload = decode_webhook(&body.to_string()).unwrap();
        assert_eq!(payload.pull_request.repository.full_name, "team/app");
    }

    #[test]
    fn test_empty_username_falls_back_to_nickname() {
        let body = json!({
            "pullrequest": {
                "id": 4,
                "title": "t",
                "author": {"username": "", "nickname": "carol", "account_id": "557058:1"},
                "destination": {"repository": {"full_name": "team/app"}}
            },
            "actor": {"username": "", "nickname": "", "account_id": "557058:2"}
        });
        let payload = decode_webhook(&body.to_string()).unwrap();
        assert_eq!(payload.pull_request.author.username, "carol");
        assert_eq!(payload.actor, Some(User::new("557058:2")));
    }
}
