//! Request and response bodies for the HTTP API.

use revassign_core::{PullRequest, PullRequestId, PullRequestShort, Team, TeamMember, User, UserId};
use serde::{Deserialize, Serialize};

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct AddTeamRequest {
    pub team_name: String,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Deserialize)]
pub struct TeamNameRequest {
    pub team_name: String,
}

#[derive(Debug, Deserialize)]
pub struct TeamQuery {
    pub team_name: String,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub team: Team,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub user_id: UserId,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct UserReviewsResponse {
    pub user_id: UserId,
    pub pull_requests: Vec<PullRequestShort>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePullRequestRequest {
    pub pull_request_id: PullRequestId,
    pub pull_request_name: String,
    pub author_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub pull_request_id: PullRequestId,
}

#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub pull_request_id: PullRequestId,
    pub old_reviewer_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct PullRequestResponse {
    pub pr: PullRequest,
}

#[derive(Debug, Serialize)]
pub struct ReassignResponse {
    pub pr: PullRequest,
    pub replaced_by: UserId,
}

/// Reject empty or whitespace-only identifiers.
pub fn require_non_blank(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::invalid_input(format!("{} must not be empty", field)));
    }
    Ok(())
}
