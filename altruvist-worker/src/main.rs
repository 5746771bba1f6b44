//! # Altruvist Worker
//!
//! Drains the outbox written by the API.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p altruvist-worker
//! ```

use altruvist_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use altruvist_shared::integrations::{notifications::NovuClient, search::SearchClient};
use altruvist_worker::{
    config::WorkerConfig,
    dispatcher::Dispatcher,
    handlers::{NotificationHandler, SearchIndexHandler},
    queue::OutboxQueue,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "altruvist_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Altruvist Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env()?;
    let pool = create_pool(DatabaseConfig::from_env()?).await?;

    let search = SearchClient::new(&config.search_host, config.search_api_key.as_deref())?;
    let novu = NovuClient::new(&config.novu_api_url, &config.novu_api_key);

    let mut dispatcher = Dispatcher::new(OutboxQueue::new(pool.clone()), config);
    dispatcher.register_handler(Arc::new(SearchIndexHandler::new(Arc::new(search))));
    dispatcher.register_handler(Arc::new(NotificationHandler::new(novu)));

    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    dispatcher.run().await?;
    close_pool(pool).await;

    Ok(())
}
