//! # Altruvist API Server
//!
//! JSON API for charities, volunteers, tasks and applications. Writes that
//! touch Meilisearch or Novu are queued in the outbox for `altruvist-worker`.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p altruvist-api
//! ```

use altruvist_api::{
    app::{build_router, AppState},
    config::Config,
};
use altruvist_shared::db::migrations::{get_migration_status, run_migrations};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "altruvist_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Altruvist API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;
    let bind_address = config.bind_address();

    let state = AppState::connect(config).await?;
    run_migrations(&state.db).await?;
    let migrations = get_migration_status(&state.db).await?;
    tracing::info!(
        applied = migrations.applied_migrations,
        latest_version = ?migrations.latest_version,
        "Database schema ready"
    );

    if let Err(e) = state.search.initialize().await {
        tracing::warn!(error = %e, "Search indexes not initialized");
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
