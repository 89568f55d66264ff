//! Pull request domain types.
//!
//! These are the values the relay keeps in its registry and pushes to
//! clients. They are deliberately independent of the Bitbucket payload
//! shapes, which are decoded into these types by `prcast-core`.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// A Bitbucket account.
///
/// Users are compared by username only; display metadata may change between
/// payloads without making two users different.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: CompactString,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl User {
    pub fn new(username: impl Into<CompactString>) -> Self {
        Self {
            username: username.into(),
            display_name: None,
            avatar_url: None,
        }
    }

    pub fn is(&self, username: &str) -> bool {
        self.username == username
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username
    }
}

impl Eq for User {}

/// A user assigned to review a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reviewer {
    pub user: User,
    pub approved: bool,
}

impl Reviewer {
    pub fn new(user: User, approved: bool) -> Self {
        Self { user, approved }
    }
}

/// Lifecycle state reported by Bitbucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    #[default]
    Open,
    Merged,
    Declined,
    Superseded,
}

impl std::fmt::Display for PullRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PullRequestState::Open => write!(f, "open"),
            PullRequestState::Merged => write!(f, "merged"),
            PullRequestState::Declined => write!(f, "declined"),
            PullRequestState::Superseded => write!(f, "superseded"),
        }
    }
}

/// Repository a pull request targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// `workspace/slug`, unique across Bitbucket.
    pub full_name: String,
    pub name: String,
}

/// Identifies a pull request.
///
/// Bitbucket numbers pull requests per repository, so the repository's full
/// name is part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub repository: String,
    pub id: u64,
}

impl PullRequestRef {
    pub fn new(repository: impl Into<String>, id: u64) -> Self {
        Self {
            repository: repository.into(),
            id,
        }
    }
}

impl std::fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.repository, self.id)
    }
}

/// Full snapshot of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub author: User,
    #[serde(default)]
    pub reviewers: Vec<Reviewer>,
    #[serde(default)]
    pub state: PullRequestState,
    pub repository: Repository,
    #[serde(default)]
    pub source_branch: Option<String>,
    #[serde(default)]
    pub destination_branch: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_on: Option<time::OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_on: Option<time::OffsetDateTime>,
}

impl PullRequest {
    pub fn key(&self) -> PullRequestRef {
        PullRequestRef::new(self.repository.full_name.clone(), self.id)
    }

    pub fn is_authored_by(&self, username: &str) -> bool {
        self.author.is(username)
    }

    pub fn has_reviewer(&self, username: &str) -> bool {
        self.reviewers.iter().any(|r| r.user.is(username))
    }

    /// Whether `username` is the author or one of the reviewers.
    pub fn concerns(&self, username: &str) -> bool {
        self.is_authored_by(username) || self.has_reviewer(username)
    }

    /// Reviewers that have not approved yet, in review order.
    pub fn pending_reviewers(&self) -> impl Iterator<Item = &Reviewer> {
        self.reviewers.iter().filter(|r| !r.approved)
    }

    /// Set the approval flag of the reviewer named `username`.
    ///
    /// Returns `false` if no such reviewer exists.
    pub fn set_approval(&mut self, username: &str, approved: bool) -> bool {
        match self.reviewers.iter_mut().find(|r| r.user.is(username)) {
            Some(reviewer) => {
                reviewer.approved = approved;
                true
            }
            None => false,
        }
    }
}

/// The pull requests relevant to one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPullRequests {
    /// Pull requests the user opened.
    pub authored: Vec<PullRequest>,
    /// Pull requests the user is asked to review.
    pub assigned: Vec<PullRequest>,
}

impl UserPullRequests {
    /// Every relevant pull request once, authored first.
    pub fn all(&self) -> Vec<&PullRequest> {
        let mut all: Vec<&PullRequest> = self.authored.iter().collect();
        for pr in &self.assigned {
            if !all.iter().any(|p| p.key() == pr.key()) {
                all.push(pr);
            }
        }
        all
    }

    pub fn is_empty(&self) -> bool {
        self.authored.is_empty() && self.assigned.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pull_request(author: &str, reviewers: &[(&str, bool)]) -> PullRequest {
        PullRequest {
            id: 7,
            title: "Add relay".to_string(),
            description: String::new(),
            author: User::new(author),
            reviewers: reviewers
                .iter()
                .map(|(name, approved)| Reviewer::new(User::new(*name), *approved))
                .collect(),
            state: PullRequestState::Open,
            repository: Repository {
                full_name: "team/app".to_string(),
                name: "app".to_string(),
            },
            source_branch: Some("feature".to_string()),
            destination_branch: Some("main".to_string()),
            link: None,
            created_on: None,
            updated_on: None,
        }
    }

    #[test]
    fn test_users_compare_by_username() {
        let mut a = User::new("alice");
        a.display_name = Some("Alice".to_string());
        assert_eq!(a, User::new("alice"));
        assert_ne!(a, User::new("bob"));
    }

    #[test]
    fn test_pending_reviewers_and_approval() {
        let mut pr = pull_request("carol", &[("alice", true), ("bob", false)]);
        let pending: Vec<_> = pr.pending_reviewers().map(|r| r.user.username.as_str()).collect();
        assert_eq!(pending, vec!["bob"]);

        assert!(pr.set_approval("bob", true));
        assert_eq!(pr.pending_reviewers().count(), 0);
        assert!(!pr.set_approval("nobody", true));
    }

    #[test]
    fn test_concerns_author_and_reviewers_only() {
        let pr = pull_request("carol", &[("dave", false)]);
        assert!(pr.concerns("carol"));
        assert!(pr.concerns("dave"));
        assert!(!pr.concerns("erin"));
        assert_eq!(pr.key(), PullRequestRef::new("team/app", 7));
    }

    #[test]
    fn test_timestamps_serialize_as_rfc3339() {
        let mut pr = pull_request("carol", &[]);
        pr.updated_on = Some(time::OffsetDateTime::from_unix_timestamp(1_709_294_400).unwrap());
        let json = serde_json::to_value(&pr).unwrap();
        assert_eq!(json["updated_on"], "2024-03-01T12:00:00Z");
        assert_eq!(json["state"], "open");
    }
}
