//! HTTP handlers for teams, users and pull requests.
//!
//! Body and query extraction failures are turned into `INVALID_INPUT` errors
//! so every failure leaves the service with the same JSON shape.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Json,
};

use super::error::ApiError;
use super::types::*;
use crate::AppState;

/// Handler: POST /team/add
pub async fn add_team(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AddTeamRequest>, JsonRejection>,
) -> Result<Json<TeamResponse>, ApiError> {
    let Json(req) = payload?;
    let team = state.directory.create_team(&req.team_name, req.members).await?;
    Ok(Json(TeamResponse { team }))
}

/// Handler: GET /team/get?team_name=
pub async fn get_team(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TeamQuery>, QueryRejection>,
) -> Result<Json<TeamResponse>, ApiError> {
    let Query(query) = query?;
    let team = state.directory.get_team(&query.team_name).await?;
    Ok(Json(TeamResponse { team }))
}

/// Handler: POST /team/deactivate
pub async fn deactivate_team(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TeamNameRequest>, JsonRejection>,
) -> Result<Json<TeamResponse>, ApiError> {
    let Json(req) = payload?;
    let team = state.directory.deactivate_team(&req.team_name).await?;
    Ok(Json(TeamResponse { team }))
}

/// Handler: POST /users/setIsActive
pub async fn set_user_active(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SetActiveRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Json(req) = payload?;
    let user = state
        .directory
        .set_user_active(&req.user_id, req.is_active)
        .await?;
    Ok(Json(UserResponse { user }))
}

/// Handler: GET /users/getReview?user_id=
///
/// Lists the pull requests the user is currently assigned to review, in any
/// status. Unknown users are `NOT_FOUND`.
pub async fn get_user_reviews(
    State(state): State<Arc<AppState>>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Json<UserReviewsResponse>, ApiError> {
    let Query(query) = query?;
    let user = state.directory.get_user(&query.user_id).await?;
    let pull_requests = state.store.list_for_reviewer(&user.id).await?;
    Ok(Json(UserReviewsResponse {
        user_id: user.id,
        pull_requests,
    }))
}

/// Handler: POST /pullRequest/create
pub async fn create_pull_request(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreatePullRequestRequest>, JsonRejection>,
) -> Result<Json<PullRequestResponse>, ApiError> {
    let Json(req) = payload?;
    require_non_blank("pull_request_id", req.pull_request_id.as_str())?;
    require_non_blank("author_id", req.author_id.as_str())?;

    let pr = state
        .engine
        .create(&req.author_id, req.pull_request_id, req.pull_request_name)
        .await?;
    Ok(Json(PullRequestResponse { pr }))
}

/// Handler: POST /pullRequest/merge
pub async fn merge_pull_request(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MergeRequest>, JsonRejection>,
) -> Result<Json<PullRequestResponse>, ApiError> {
    let Json(req) = payload?;
    let pr = state.engine.merge(&req.pull_request_id).await?;
    Ok(Json(PullRequestResponse { pr }))
}

/// Handler: POST /pullRequest/reassign
pub async fn reassign_reviewer(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReassignRequest>, JsonRejection>,
) -> Result<Json<ReassignResponse>, ApiError> {
    let Json(req) = payload?;
    let outcome = state
        .engine
        .reassign(&req.pull_request_id, &req.old_reviewer_id)
        .await?;
    Ok(Json(ReassignResponse {
        pr: outcome.pull_request,
        replaced_by: outcome.replaced_by,
    }))
}
