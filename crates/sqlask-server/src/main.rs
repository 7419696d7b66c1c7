//! sqlask server binary
//!
//! Accepts dataset uploads, turns natural language questions into SQL with
//! an LLM and answers them from DuckDB.

use anyhow::Context;
use sqlask_core::prelude::*;
use sqlask_duck::DuckStore;
use sqlask_server::{config::Config, llm::OpenAiModel, logging, metrics::Metrics, router, AppState};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets first so config overrides can see them too
    dotenvy::dotenv().ok();

    let config_path = std::env::var("SQLASK_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;

    logging::init(&config.logging)?;
    info!(config = %config_path, "Configuration loaded");

    let store = match &config.database.path {
        Some(path) => DuckStore::open(path)?,
        None => {
            info!("Using in-memory DuckDB database");
            DuckStore::open_in_memory()?
        }
    };

    let api_key = Config::get_openai_api_key()?;
    let model = OpenAiModel::new(api_key, &config.llm);

    let upload_dir = config.datasets.directory_path();
    std::fs::create_dir_all(&upload_dir)
        .with_context(|| format!("creating dataset directory {}", upload_dir.display()))?;

    let pipeline = Pipeline::new(
        Arc::new(store),
        Arc::new(model),
        PipelineOptions {
            data_dir: Some(upload_dir.clone()),
            lazy_registration: config.datasets.lazy_registration,
        },
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
        metrics: Arc::new(Metrics::new()?),
        upload_dir,
        max_upload_bytes: config.datasets.max_upload_mb.saturating_mul(1024 * 1024),
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(
        addr = %addr,
        lazy_registration = config.datasets.lazy_registration,
        data_dir = %config.datasets.directory,
        "sqlask server listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}
