pub mod api;
pub mod config;
pub mod engine;
pub mod repository;

use std::sync::Arc;

use axum::{response::Json, routing::get, Router};
use revassign_core::ReviewerSelector;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use engine::LifecycleEngine;
use repository::{PullRequestStore, TeamDirectory};

pub fn get_service_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct AppState {
    pub engine: LifecycleEngine,
    pub directory: Arc<dyn TeamDirectory>,
    pub store: Arc<dyn PullRequestStore>,
}

impl AppState {
    /// Wire the engine and handlers to a backend that serves both storage
    /// contracts.
    pub fn with_backend<B>(backend: Arc<B>, selector: ReviewerSelector) -> Self
    where
        B: TeamDirectory + PullRequestStore + 'static,
    {
        let directory: Arc<dyn TeamDirectory> = backend.clone();
        let store: Arc<dyn PullRequestStore> = backend;

        Self {
            engine: LifecycleEngine::new(directory.clone(), store.clone(), selector),
            directory,
            store,
        }
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "revassign",
        "version": get_service_version(),
    }))
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(api::api_router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
