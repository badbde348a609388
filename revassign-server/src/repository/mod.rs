//! Storage contracts for teams, users and pull requests.
//!
//! The lifecycle engine only talks to storage through [`TeamDirectory`] and
//! [`PullRequestStore`]. Two backends implement both traits: an in-memory
//! one (state lost on restart) and a SQLite one.

mod memory;
pub mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use std::collections::HashSet;

use async_trait::async_trait;
use revassign_core::{
    ErrorKind, PullRequest, PullRequestId, PullRequestShort, Team, TeamMember, User, UserId,
};
use thiserror::Error;

/// Errors returned by storage backends.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{resource} '{id}' not found")]
    NotFound { resource: &'static str, id: String },

    #[error("pull request '{0}' already exists")]
    PullRequestExists(PullRequestId),

    #[error("team '{0}' already exists")]
    TeamExists(String),

    #[error("username '{0}' is already taken")]
    UserExists(String),

    /// A write tried to replace a merged pull request with an open snapshot.
    #[error("pull request '{0}' is already merged")]
    PullRequestMerged(PullRequestId),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    #[error("corrupt {0} in storage")]
    Corruption(&'static str),
}

impl RepositoryError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: &'static str) -> Self {
        Self::Corruption(what)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::PullRequestExists(_) => ErrorKind::AlreadyExists,
            Self::TeamExists(_) => ErrorKind::TeamExists,
            Self::UserExists(_) => ErrorKind::UserExists,
            Self::PullRequestMerged(_) => ErrorKind::PullRequestMerged,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Storage { .. } | Self::Corruption(_) => ErrorKind::Internal,
        }
    }
}

/// Team membership and user activity.
#[async_trait]
pub trait TeamDirectory: Send + Sync {
    /// Active users in the same team as `user_id`, excluding `user_id` itself
    /// and every id in `excluding`, ordered by user id.
    ///
    /// Fails with `NotFound` if the user does not exist or has no team.
    async fn active_teammates(
        &self,
        user_id: &UserId,
        excluding: &[UserId],
    ) -> Result<Vec<User>, RepositoryError>;

    /// Create a team and attach the given members to it in one step.
    async fn create_team(
        &self,
        team_name: &str,
        members: Vec<TeamMember>,
    ) -> Result<Team, RepositoryError>;

    async fn get_team(&self, team_name: &str) -> Result<Team, RepositoryError>;

    /// Mark every member of the team inactive.
    async fn deactivate_team(&self, team_name: &str) -> Result<Team, RepositoryError>;

    async fn set_user_active(
        &self,
        user_id: &UserId,
        is_active: bool,
    ) -> Result<User, RepositoryError>;

    async fn get_user(&self, user_id: &UserId) -> Result<User, RepositoryError>;
}

/// Durable pull request records and their reviewer assignments.
#[async_trait]
pub trait PullRequestStore: Send + Sync {
    /// Insert a new pull request with its reviewers atomically.
    ///
    /// Fails with `PullRequestExists` if the id is taken and `NotFound` if the
    /// author does not exist. Uniqueness is enforced by the backend, so two
    /// concurrent creates with the same id cannot both succeed.
    async fn create(&self, pr: &PullRequest) -> Result<(), RepositoryError>;

    /// Fetch a pull request with reviewers in slot order.
    async fn get(&self, id: &PullRequestId) -> Result<PullRequest, RepositoryError>;

    /// Persist mutable fields and replace the whole reviewer set atomically.
    ///
    /// Refuses to overwrite a merged row with an open snapshot.
    async fn save(&self, pr: &PullRequest) -> Result<(), RepositoryError>;

    /// Mark the pull request merged now. Merging a merged pull request leaves
    /// it untouched.
    async fn merge(&self, id: &PullRequestId) -> Result<(), RepositoryError>;

    /// Pull requests where `user_id` is currently an assigned reviewer.
    async fn list_for_reviewer(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PullRequestShort>, RepositoryError>;
}

/// Shared input checks for `create_team`.
pub(crate) fn validate_new_team(
    team_name: &str,
    members: &[TeamMember],
) -> Result<(), RepositoryError> {
    if team_name.trim().is_empty() {
        return Err(RepositoryError::InvalidInput(
            "team_name must not be empty".to_string(),
        ));
    }

    let mut ids = HashSet::new();
    let mut usernames = HashSet::new();
    for member in members {
        if member.username.trim().is_empty() {
            return Err(RepositoryError::InvalidInput(
                "member username must not be empty".to_string(),
            ));
        }
        if let Some(id) = &member.user_id {
            if id.as_str().trim().is_empty() {
                return Err(RepositoryError::InvalidInput(
                    "member user_id must not be empty".to_string(),
                ));
            }
            if !ids.insert(id.clone()) {
                return Err(RepositoryError::InvalidInput(format!(
                    "user '{}' listed more than once",
                    id
                )));
            }
        }
        if !usernames.insert(member.username.as_str()) {
            return Err(RepositoryError::UserExists(member.username.clone()));
        }
    }

    Ok(())
}
