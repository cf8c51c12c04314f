//! Scale webhook - scales a compose service on Alertmanager alerts
//!
//! Receives throughput alerts on `POST /alert` and converges the replica
//! count through docker-compose, falling back to the Docker API.

use anyhow::{Context, Result};
use scale_webhook::{api, config::Settings, Webhook};
use scaler_lib::{create_runtime, StructuredLogger};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const WEBHOOK_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting scale-webhook");

    let settings = Settings::load()?;
    let scaling = Arc::new(settings.scaling);
    info!(
        service = %scaling.service_label,
        min = scaling.min_replicas,
        max = scaling.max_replicas,
        step = scaling.scale_step,
        compose = scaling.compose_enabled,
        "Webhook configured"
    );

    let runtime = create_runtime(settings.server.runtime)
        .context("Failed to set up container runtime")?;
    let webhook = Arc::new(Webhook::build(runtime, scaling.clone()).await?);
    webhook.check_runtime().await;

    let logger = StructuredLogger::new(&scaling.service_label);
    logger.log_startup(
        WEBHOOK_VERSION,
        settings.server.port,
        scaling.min_replicas,
        scaling.max_replicas,
    );

    let delay = Duration::from_millis(settings.server.bootstrap_delay_ms);
    let bootstrap = webhook.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        bootstrap.bootstrap().await;
    });

    let api_handle = tokio::spawn(api::serve(settings.server.port, webhook.state.clone()));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server stopped"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    return Err(e);
                }
                Err(e) => return Err(e).context("API server task panicked"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
