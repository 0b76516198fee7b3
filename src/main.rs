use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

use portal_status::api::{self, AppState};
use portal_status::clock::SystemClock;
use portal_status::config::ServiceConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_ansi(true)
        .init();

    let config = ServiceConfig::from_env().context("Failed to load configuration")?;
    let state = AppState::from_config(&config, Arc::new(SystemClock))
        .context("Failed to build status monitor")?;

    info!("Monitoring: {}", config.onion_url);
    match &config.proxy {
        Some(proxy) => info!("Tor proxy: {}", proxy),
        None => info!("Tor proxy: disabled, probing directly"),
    }
    info!("CORS origin: {}", config.cors_origin);

    let sweeper = state.limiter.spawn_sweeper(config.rate_limit_window);

    api::start_server(&config, state, shutdown_signal())
        .await
        .context("Status API failed")?;

    sweeper.cancel().await;
    info!("Shutdown complete.");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("SIGINT received, shutting down gracefully...");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("SIGTERM received, shutting down gracefully...");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
