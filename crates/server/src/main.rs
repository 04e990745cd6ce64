//! Insider threat detection server
//!
//! Loads the tree and sequence models once at startup and serves session
//! scoring, model metadata, health and metrics over HTTP.

use anyhow::{Context, Result};
use detect_lib::{
    config::Settings,
    observability::{self, StructuredLogger},
    ModelService, TractRuntime,
};
use std::sync::Arc;
use tracing::{error, info};

mod api;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load settings")?;
    observability::init_tracing(&settings.monitoring)?;

    let logger = StructuredLogger::new(&settings.app_name);
    logger.log_startup(SERVER_VERSION, settings.environment.as_str());
    info!(
        model_dir = %settings.model.model_dir.display(),
        xgb_weight = settings.model.xgb_weight,
        lstm_weight = settings.model.lstm_weight,
        threshold = settings.model.threshold,
        "Server configured"
    );

    let service = Arc::new(
        ModelService::new(settings.model.clone(), Arc::new(TractRuntime::new()))
            .context("Invalid model configuration")?,
    );
    if let Err(e) = service.initialize().await {
        error!(error = %e, "Model service failed to initialize, aborting startup");
        return Err(e).context("Model service failed to initialize");
    }

    let api_config = settings.api.clone();
    let state = api::AppState::new(Arc::clone(&service), settings).await;

    api::serve(&api_config, state, shutdown_signal()).await?;

    logger.log_shutdown("SIGINT received");
    service.cleanup().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
