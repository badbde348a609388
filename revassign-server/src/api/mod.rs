//! JSON API over the team directory and the lifecycle engine.

pub mod error;
pub mod handlers;
pub mod types;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub use error::ApiError;

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/team/add", post(handlers::add_team))
        .route("/team/get", get(handlers::get_team))
        .route("/team/deactivate", post(handlers::deactivate_team))
        .route("/users/setIsActive", post(handlers::set_user_active))
        .route("/users/getReview", get(handlers::get_user_reviews))
        .route("/pullRequest/create", post(handlers::create_pull_request))
        .route("/pullRequest/merge", post(handlers::merge_pull_request))
        .route("/pullRequest/reassign", post(handlers::reassign_reviewer))
}
