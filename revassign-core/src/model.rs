//! Domain types for users, teams and pull requests.
//!
//! Identifiers are newtypes so a user id can never be passed where a pull
//! request id is expected. All types serialize with the field names used on
//! the wire, so the HTTP layer can return them directly.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Current time at millisecond precision, the resolution timestamps are stored at.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Opaque unique identifier of a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Caller-supplied unique identifier of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PullRequestId(pub String);

impl PullRequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PullRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PullRequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PullRequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A person who can author or review pull requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "user_id")]
    pub id: UserId,
    pub username: String,
    pub is_active: bool,
    /// Name of the team the user belongs to, if any. A user is in at most one team.
    pub team_name: Option<String>,
}

/// A named group of users. Reviewers are only ever drawn from the author's team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    #[serde(rename = "team_name")]
    pub name: String,
    pub members: Vec<User>,
}

/// A member entry supplied when creating a team.
///
/// With `user_id` set, the existing user of that id is moved into the team
/// (or created under that id if unknown). Without it a new user is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub username: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Pull request status. `Merged` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PullRequestStatus {
    Open,
    Merged,
}

impl PullRequestStatus {
    /// Stable string form, also used as the persisted column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Merged => "MERGED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(Self::Open),
            "MERGED" => Some(Self::Merged),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Merged)
    }
}

impl fmt::Display for PullRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pull request together with its currently assigned reviewers.
///
/// `reviewers` is ordered: each position is a reviewer slot, and reassignment
/// replaces one slot in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(rename = "pull_request_id")]
    pub id: PullRequestId,
    #[serde(rename = "pull_request_name")]
    pub name: String,
    pub author_id: UserId,
    pub status: PullRequestStatus,
    #[serde(rename = "assigned_reviewers")]
    pub reviewers: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl PullRequest {
    /// Build a freshly opened pull request.
    pub fn open(
        id: PullRequestId,
        name: impl Into<String>,
        author_id: UserId,
        reviewers: Vec<UserId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            author_id,
            status: PullRequestStatus::Open,
            reviewers,
            created_at,
            merged_at: None,
        }
    }

    pub fn is_merged(&self) -> bool {
        self.status == PullRequestStatus::Merged
    }

    /// Position of `reviewer` in the reviewer list, if assigned.
    pub fn reviewer_slot(&self, reviewer: &UserId) -> Option<usize> {
        self.reviewers.iter().position(|r| r == reviewer)
    }

    pub fn has_reviewer(&self, reviewer: &UserId) -> bool {
        self.reviewer_slot(reviewer).is_some()
    }

    /// Short projection used when listing a user's reviews.
    pub fn to_short(&self) -> PullRequestShort {
        PullRequestShort {
            id: self.id.clone(),
            name: self.name.clone(),
            author_id: self.author_id.clone(),
            status: self.status,
        }
    }
}

/// Pull request summary without reviewers or timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestShort {
    #[serde(rename = "pull_request_id")]
    pub id: PullRequestId,
    #[serde(rename = "pull_request_name")]
    pub name: String,
    pub author_id: UserId,
    pub status: PullRequestStatus,
}
