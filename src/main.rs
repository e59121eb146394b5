use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use georgia_qa::config::Settings;
use georgia_qa::rag::RagEngine;
use georgia_qa::server::{create_app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let settings = Settings::load()?;

    tracing::info!("Connecting to Qdrant: {}", settings.qdrant.url);
    tracing::info!("Using OpenAI endpoint: {}", settings.openai.base_url);

    let engine = RagEngine::connect(&settings).await.map_err(|e| {
        tracing::error!("Failed to initialize services: {:#}", e);
        e
    })?;
    tracing::info!("Services initialized successfully");

    let state = Arc::new(AppState {
        engine,
        collection: settings.qdrant.collection.clone(),
    });
    let app = create_app(state, settings.request_timeout());

    let listener = tokio::net::TcpListener::bind(settings.bind_addr()).await?;
    tracing::info!("Question answering API listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
