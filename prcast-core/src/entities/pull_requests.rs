//! In-memory pull request registry.
//!
//! Entries are keyed by [`PullRequestRef`] and indexed by author and reviewer
//! username. Entries, author index and reviewer index sit behind one
//! `RwLock`, so every mutation is applied under a single write guard and
//! readers never observe a half-applied change.

use compact_str::CompactString;
use kanau::processor::Processor;
use prcast_sdk::objects::{PullRequest, PullRequestRef, UserPullRequests};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors returned by registry mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("pull request {0} not found")]
    NotFound(PullRequestRef),

    #[error("pull request {0} already exists")]
    Duplicate(PullRequestRef),
}

#[derive(Default)]
struct Entries {
    by_key: BTreeMap<PullRequestRef, PullRequest>,
    by_author: HashMap<CompactString, BTreeSet<PullRequestRef>>,
    by_reviewer: HashMap<CompactString, BTreeSet<PullRequestRef>>,
}

impl Entries {
    fn index(&mut self, pr: &PullRequest) {
        let key = pr.key();
        self.by_author
            .entry(pr.author.username.clone())
            .or_default()
            .insert(key.clone());
        for reviewer in &pr.reviewers {
            self.by_reviewer
                .entry(reviewer.user.username.clone())
                .or_default()
                .insert(key.clone());
        }
    }

    fn unindex(&mut self, pr: &PullRequest) {
        let key = pr.key();
        remove_from_index(&mut self.by_author, &pr.author.username, &key);
        for reviewer in &pr.reviewers {
            remove_from_index(&mut self.by_reviewer, &reviewer.user.username, &key);
        }
    }

    /// Store `pr`, re-indexing over any previous entry with the same key.
    fn put(&mut self, pr: PullRequest) -> Option<PullRequest> {
        let previous = self.by_key.remove(&pr.key());
        if let Some(previous) = &previous {
            self.unindex(previous);
        }
        self.index(&pr);
        self.by_key.insert(pr.key(), pr);
        previous
    }

    fn collect(&self, index: &HashMap<CompactString, BTreeSet<PullRequestRef>>, username: &str) -> Vec<PullRequest> {
        index
            .get(username)
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| self.by_key.get(key).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn remove_from_index(
    index: &mut HashMap<CompactString, BTreeSet<PullRequestRef>>,
    username: &str,
    key: &PullRequestRef,
) {
    if let Some(keys) = index.get_mut(username) {
        keys.remove(key);
        if keys.is_empty() {
            index.remove(username);
        }
    }
}

/// Process-wide pull request store.
///
/// Cloning is cheap; all clones share the same entries.
#[derive(Clone, Default)]
pub struct PullRequestRepository {
    entries: Arc<RwLock<Entries>>,
}

impl PullRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pull request that is not stored yet.
    pub async fn insert(&self, pr: PullRequest) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().await;
        let key = pr.key();
        if entries.by_key.contains_key(&key) {
            return Err(RegistryError::Duplicate(key));
        }
        entries.put(pr);
        Ok(())
    }

    /// Store a pull request whether or not it exists, returning the entry it
    /// replaced.
    pub async fn upsert(&self, pr: PullRequest) -> Option<PullRequest> {
        self.entries.write().await.put(pr)
    }

    /// Replace a stored pull request with a newer snapshot, returning the
    /// previous one.
    pub async fn replace(&self, pr: PullRequest) -> Result<PullRequest, RegistryError> {
        let mut entries = self.entries.write().await;
        let key = pr.key();
        if !entries.by_key.contains_key(&key) {
            return Err(RegistryError::NotFound(key));
        }
        entries.put(pr).ok_or(RegistryError::NotFound(key))
    }

    pub async fn remove(&self, key: &PullRequestRef) -> Result<PullRequest, RegistryError> {
        let mut entries = self.entries.write().await;
        let removed = entries
            .by_key
            .remove(key)
            .ok_or_else(|| RegistryError::NotFound(key.clone()))?;
        entries.unindex(&removed);
        Ok(removed)
    }

    pub async fn find_by_identifier(&self, key: &PullRequestRef) -> Option<PullRequest> {
        self.entries.read().await.by_key.get(key).cloned()
    }

    pub async fn find_by_author(&self, username: &str) -> Vec<PullRequest> {
        let entries = self.entries.read().await;
        entries.collect(&entries.by_author, username)
    }

    pub async fn find_by_reviewer(&self, username: &str) -> Vec<PullRequest> {
        let entries = self.entries.read().await;
        entries.collect(&entries.by_reviewer, username)
    }

    /// Everything `username` authored or reviews, read under one guard.
    pub async fn find_by_user(&self, username: &str) -> UserPullRequests {
        let entries = self.entries.read().await;
        UserPullRequests {
            authored: entries.collect(&entries.by_author, username),
            assigned: entries.collect(&entries.by_reviewer, username),
        }
    }

    pub async fn find_all(&self) -> Vec<PullRequest> {
        self.entries.read().await.by_key.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.by_key.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        *self.entries.write().await = Entries::default();
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Look up one pull request.
#[derive(Debug, Clone)]
pub struct GetPullRequest {
    pub key: PullRequestRef,
}

/// Compute a user's current view.
#[derive(Debug, Clone)]
pub struct GetUserPullRequests {
    pub username: CompactString,
}

impl Processor<GetPullRequest> for PullRequestRepository {
    type Output = Option<PullRequest>;
    type Error = Infallible;
    #[tracing::instrument(skip_all, name = "Registry:GetPullRequest")]
    async fn process(&self, query: GetPullRequest) -> Result<Option<PullRequest>, Infallible> {
        Ok(self.find_by_identifier(&query.key).await)
    }
}

impl Processor<GetUserPullRequests> for PullRequestRepository {
    type Output = UserPullRequests;
    type Error = Infallible;
    #[tracing::instrument(skip_all, name = "Registry:GetUserPullRequests")]
    async fn process(&self, query: GetUserPullRequests) -> Result<UserPullRequests, Infallible> {
        Ok(self.find_by_user(&query.username).await)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use prcast_sdk::objects::{PullRequestState, Repository, Reviewer, User};

    pub(crate) fn pull_request(id: u64, author: &str, reviewers: &[(&str, bool)]) -> PullRequest {
        PullRequest {
            id,
            title: format!("Pull request {id}"),
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
            source_branch: Some(format!("feature/{id}")),
            destination_branch: Some("main".to_string()),
            link: None,
            created_on: None,
            updated_on: None,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_identifier() {
        let repo = PullRequestRepository::new();
        repo.insert(pull_request(1, "carol", &[])).await.unwrap();

        let err = repo.insert(pull_request(1, "dave", &[])).await.unwrap_err();
        assert_eq!(err, RegistryError::Duplicate(PullRequestRef::new("team/app", 1)));
        assert_eq!(repo.len().await, 1);
        assert_eq!(repo.find_by_author("carol").await.len(), 1);
        assert!(repo.find_by_author("dave").await.is_empty());
    }

    #[tokio::test]
    async fn test_replace_reindexes_reviewers() {
        let repo = PullRequestRepository::new();
        repo.insert(pull_request(1, "carol", &[("dave", false)])).await.unwrap();

        let previous = repo
            .replace(pull_request(1, "carol", &[("erin", false)]))
            .await
            .unwrap();
        assert!(previous.has_reviewer("dave"));
        assert!(repo.find_by_reviewer("dave").await.is_empty());
        assert_eq!(repo.find_by_reviewer("erin").await.len(), 1);
    }

    #[tokio::test]
    async fn test_replace_and_remove_unknown_identifier() {
        let repo = PullRequestRepository::new();
        let key = PullRequestRef::new("team/app", 9);

        assert_eq!(
            repo.replace(pull_request(9, "carol", &[])).await.unwrap_err(),
            RegistryError::NotFound(key.clone())
        );
        assert_eq!(repo.remove(&key).await.unwrap_err(), RegistryError::NotFound(key));
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_find_by_user_splits_authored_and_assigned() {
        let repo = PullRequestRepository::new();
        repo.insert(pull_request(1, "carol", &[("dave", false)])).await.unwrap();
        repo.insert(pull_request(2, "dave", &[("carol", true)])).await.unwrap();
        repo.insert(pull_request(3, "erin", &[])).await.unwrap();

        let view = repo.find_by_user("carol").await;
        assert_eq!(view.authored.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(view.assigned.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2]);

        repo.remove(&PullRequestRef::new("team/app", 2)).await.unwrap();
        let view = repo.find_by_user("carol").await;
        assert!(view.assigned.is_empty());
        assert!(repo.find_by_user("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn test_same_number_in_different_repositories() {
        let repo = PullRequestRepository::new();
        let mut other = pull_request(1, "carol", &[]);
        other.repository.full_name = "team/other".to_string();
        repo.insert(pull_request(1, "carol", &[])).await.unwrap();
        repo.insert(other).await.unwrap();

        assert_eq!(repo.find_by_author("carol").await.len(), 2);
    }

    #[tokio::test]
    async fn test_processor_queries() {
        let repo = PullRequestRepository::new();
        repo.insert(pull_request(4, "carol", &[("dave", false)])).await.unwrap();

        let found = repo
            .process(GetPullRequest {
                key: PullRequestRef::new("team/app", 4),
            })
            .await
            .unwrap();
        assert!(found.is_some());

        let view = repo
            .process(GetUserPullRequests {
                username: "dave".into(),
            })
            .await
            .unwrap();
        assert_eq!(view.assigned.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_half_applied_replace() {
        let repo = PullRequestRepository::new();
        repo.insert(pull_request(1, "carol", &[("dave", false)])).await.unwrap();

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    for i in 0..200 {
                        let reviewer = if (i + w) % 2 == 0 { "dave" } else { "erin" };
                        repo.replace(pull_request(1, "carol", &[(reviewer, false)]))
                            .await
                            .unwrap();
                    }
                })
            })
            .collect();

        let readers: Vec<_> = ["dave", "erin"]
            .into_iter()
            .map(|username| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    for _ in 0..400 {
                        let view = repo.find_by_user(username).await;
                        assert!(view.assigned.len() <= 1);
                        for pr in &view.assigned {
                            assert!(pr.has_reviewer(username), "{username} saw {pr:?}");
                        }
                        assert!(view.authored.is_empty());
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.await.unwrap();
        }
        assert_eq!(repo.len().await, 1);
        let last = repo.find_all().await;
        let dave = repo.find_by_reviewer("dave").await.len();
        let erin = repo.find_by_reviewer("erin").await.len();
        assert_eq!(dave + erin, 1);
        assert_eq!(last[0].reviewers.len(), 1);
    }
}
