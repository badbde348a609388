//! Error responses for the HTTP API.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use revassign_core::ErrorKind;
use serde::Serialize;

use crate::engine::LifecycleError;
use crate::repository::RepositoryError;

/// HTTP status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::TeamExists => StatusCode::BAD_REQUEST,
        ErrorKind::UserExists => StatusCode::CONFLICT,
        ErrorKind::PullRequestMerged => StatusCode::CONFLICT,
        ErrorKind::NotAssigned => StatusCode::CONFLICT,
        ErrorKind::NoCandidate => StatusCode::CONFLICT,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// An error as returned to API clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    code: &'static str,
    message: &'a str,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.kind)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.message);
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.kind.code(),
                message: &self.message,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_input(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid_input(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revassign_core::PullRequestId;

    #[test]
    fn test_status_table() {
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::AlreadyExists), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::TeamExists), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::PullRequestMerged), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::NotAssigned), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::NoCandidate), StatusCode::CONFLICT);
        assert_eq!(
            status_for(ErrorKind::Internal),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_lifecycle_error_keeps_kind() {
        let err = LifecycleError::NotAssigned {
            pull_request: PullRequestId::from("p1"),
            reviewer: "u9".into(),
        };
        let api: ApiError = err.into();
        assert_eq!(api.kind, ErrorKind::NotAssigned);
        assert!(api.message.contains("u9"));
    }

    #[test]
    fn test_repository_error_passes_through_lifecycle() {
        let err: LifecycleError = RepositoryError::not_found("pull request", "p1").into();
        let api: ApiError = err.into();
        assert_eq!(api.kind, ErrorKind::NotFound);
        assert_eq!(api.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_response_body_shape() {
        let response = ApiError::new(ErrorKind::NoCandidate, "nobody left").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "NO_CANDIDATE");
        assert_eq!(body["error"]["message"], "nobody left");
    }
}
