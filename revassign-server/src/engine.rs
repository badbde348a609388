//! Pull request lifecycle: creation with reviewer assignment, merging, and
//! reviewer reassignment.
//!
//! The engine holds no state of its own beyond the selector's random source.
//! Conflicting writes are serialized by the storage backends; duplicate
//! creates in particular are rejected by the store, never by a check here.

use std::sync::Arc;

use revassign_core::{
    timestamp_now, ErrorKind, PullRequest, PullRequestId, ReviewerSelector, UserId,
};
use thiserror::Error;
use tracing::info;

use crate::repository::{PullRequestStore, RepositoryError, TeamDirectory};

/// Number of reviewers assigned to a new pull request when the team allows it.
pub const MAX_REVIEWERS: usize = 2;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("pull request '{0}' is merged and can no longer be reassigned")]
    PullRequestMerged(PullRequestId),

    #[error("user '{reviewer}' is not a reviewer of pull request '{pull_request}'")]
    NotAssigned {
        pull_request: PullRequestId,
        reviewer: UserId,
    },

    #[error("no active teammate of '{author}' can take over pull request '{pull_request}'")]
    NoCandidate {
        pull_request: PullRequestId,
        author: UserId,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PullRequestMerged(_) => ErrorKind::PullRequestMerged,
            Self::NotAssigned { .. } => ErrorKind::NotAssigned,
            Self::NoCandidate { .. } => ErrorKind::NoCandidate,
            Self::Repository(e) => e.kind(),
        }
    }
}

/// Outcome of a successful reassignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassignment {
    pub pull_request: PullRequest,
    pub replaced_by: UserId,
}

pub struct LifecycleEngine {
    directory: Arc<dyn TeamDirectory>,
    store: Arc<dyn PullRequestStore>,
    selector: ReviewerSelector,
}

impl LifecycleEngine {
    pub fn new(
        directory: Arc<dyn TeamDirectory>,
        store: Arc<dyn PullRequestStore>,
        selector: ReviewerSelector,
    ) -> Self {
        Self {
            directory,
            store,
            selector,
        }
    }

    /// Open a pull request and assign up to [`MAX_REVIEWERS`] active teammates
    /// of the author.
    ///
    /// A team with fewer eligible teammates gets fewer reviewers, possibly none.
    pub async fn create(
        &self,
        author_id: &UserId,
        pr_id: PullRequestId,
        name: impl Into<String>,
    ) -> Result<PullRequest, LifecycleError> {
        let pool = self.directory.active_teammates(author_id, &[]).await?;
        let reviewers: Vec<UserId> = self
            .selector
            .select(pool, MAX_REVIEWERS)
            .into_iter()
            .map(|u| u.id)
            .collect();

        let pr = PullRequest::open(pr_id, name, author_id.clone(), reviewers, timestamp_now());
        self.store.create(&pr).await?;

        info!(
            "Created pull request {} by {} with {} reviewer(s)",
            pr.id,
            pr.author_id,
            pr.reviewers.len()
        );
        Ok(pr)
    }

    /// Merge a pull request. Merging an already merged pull request returns
    /// it unchanged.
    pub async fn merge(&self, pr_id: &PullRequestId) -> Result<PullRequest, LifecycleError> {
        let pr = self.store.get(pr_id).await?;
        if pr.is_merged() {
            return Ok(pr);
        }

        self.store.merge(pr_id).await?;
        let merged = self.store.get(pr_id).await?;

        info!("Merged pull request {}", merged.id);
        Ok(merged)
    }

    /// Replace `old_reviewer` with a random active teammate of the author who
    /// is not already reviewing. The new reviewer takes the old one's slot.
    pub async fn reassign(
        &self,
        pr_id: &PullRequestId,
        old_reviewer: &UserId,
    ) -> Result<Reassignment, LifecycleError> {
        let mut pr = self.store.get(pr_id).await?;

        if pr.is_merged() {
            return Err(LifecycleError::PullRequestMerged(pr.id));
        }

        let Some(slot) = pr.reviewer_slot(old_reviewer) else {
            return Err(LifecycleError::NotAssigned {
                pull_request: pr.id,
                reviewer: old_reviewer.clone(),
            });
        };

        let pool = self
            .directory
            .active_teammates(&pr.author_id, &pr.reviewers)
            .await?;

        let Some(new_reviewer) = self.selector.select(pool, 1).into_iter().next() else {
            return Err(LifecycleError::NoCandidate {
                pull_request: pr.id,
                author: pr.author_id,
            });
        };

        pr.reviewers[slot] = new_reviewer.id.clone();
        self.store.save(&pr).await?;

        info!(
            "Reassigned pull request {}: {} replaced by {}",
            pr.id, old_reviewer, new_reviewer.id
        );
        Ok(Reassignment {
            pull_request: pr,
            replaced_by: new_reviewer.id,
        })
    }
}
