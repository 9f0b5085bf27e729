//! # OI4 Edge Agent
//!
//! Runs one OI4 application on an MQTT broker until Ctrl+C.

use anyhow::{Context, Result};
use oi4_edge_service::{AgentConfig, Application, ApplicationSource, MqttTransport};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting OI4 Edge Agent");

    // Load configuration
    let config = AgentConfig::from_env()?;

    let (transport, eventloop) =
        MqttTransport::new(&config.mqtt).context("Failed to create MQTT transport")?;
    let transport = Arc::new(transport);
    let driver = transport.spawn_eventloop(eventloop);

    let source = ApplicationSource::new(config.master_asset_model());
    let application = Application::new(config.service_type, source, config.application_config())
        .context("Failed to create application")?;

    tracing::info!(
        application = %application.identifier(),
        broker = %config.mqtt.broker,
        "Application initialized"
    );

    application
        .start(transport.clone())
        .context("Failed to start application")?;

    tracing::info!("Agent running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    application.stop();

    // Let the event loop flush the shutdown health message
    tokio::time::sleep(Duration::from_millis(250)).await;
    if let Err(e) = transport.disconnect() {
        tracing::warn!(error = %e, "Failed to disconnect from broker");
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    driver.abort();

    tracing::info!("Agent stopped");
    Ok(())
}
