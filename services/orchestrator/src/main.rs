//! qorch orchestrator service
//!
//! Serves quota queries, allocations, recommendations and dependency status
//! over HTTP.

use anyhow::{Context, Result};
use qorch_orchestrator::{api, config, AppState, Engine};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to QORCH_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting qorch orchestrator");
    info!(
        listen_addr = %config.listen_addr,
        quota_file = %config.quota_file.display(),
        "Configuration loaded"
    );

    let listen_addr = config.listen_addr;
    let engine = match Engine::build(config) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Failed to initialise engine");
            return Err(e);
        }
    };

    let connections = engine.probe.check_connections().await;
    if !connections.is_fully_connected() {
        for message in &connections.messages {
            info!(message = %message, "Dependency degraded at startup");
        }
    }

    let app = api::create_router(AppState::new(engine));

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    info!(addr = %listen_addr, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        })
        .await?;

    info!("Orchestrator shutdown complete");
    Ok(())
}
