use anyhow::Result;
use adpulse_api::run as run_api;
use adpulse_core::AppContext;
use adpulse_core::Config;
use adpulse_sync::run_poller;
use tokio;
use tracing;
use tracing_subscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting AdPulse Server");

    // Load configuration
    let config = Config::from_env();
    let ctx = AppContext::new(config).await?;

    tracing::info!("Application context initialized");

    // Scheduled sync runs as a background task
    let ctx_clone = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = run_poller(ctx_clone).await {
            tracing::error!("Sync scheduler error: {}", e);
        }
    });

    // API server runs in main task
    tracing::info!("Starting API server");
    run_api(ctx).await?;

    Ok(())
}
