use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use revassign_core::ReviewerSelector;
use revassign_server::config::{Config, StorageBackend};
use revassign_server::repository::{InMemoryRepository, SqliteRepository};
use revassign_server::{build_router, get_service_version, AppState};

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    info!("Starting revassign {}", get_service_version());

    let selector = ReviewerSelector::from_entropy();
    let state = match config.storage_backend {
        StorageBackend::Sqlite => {
            let db_path = config.database_path();
            info!("Using state database: {}", db_path.display());
            let repo = SqliteRepository::new(&db_path)
                .with_context(|| format!("Failed to open database {}", db_path.display()))?;
            AppState::with_backend(Arc::new(repo), selector)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; state is lost on restart");
            AppState::with_backend(Arc::new(InMemoryRepository::new()), selector)
        }
    };

    let app = build_router(Arc::new(state));

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("Server listening on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
