//! IP Rotator - Entry Point
//!
//! Creates the regional endpoints, runs the local relay until shutdown, and deletes
//! the endpoints again.

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ip_rotator::config::LogConfig;
use ip_rotator::gateway::ApiGatewayConnector;
use ip_rotator::models::RegionPreset;
use ip_rotator::proxy::RelayServer;
use ip_rotator::{Config, RotatingClient, RotationManager};

#[derive(Parser)]
#[command(name = "ip-rotator")]
#[command(about = "Rotate outgoing IP addresses through regional API gateways", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create endpoints and relay requests through them until shutdown (default)
    Serve,

    /// Delete gateways left behind by earlier runs in every configured region
    Sweep,

    /// List the region presets
    Regions,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Regions => {
            print_regions();
            Ok(())
        }
        Commands::Serve => {
            let config = load_config()?;
            serve(config).await
        }
        Commands::Sweep => {
            let config = load_config()?;
            sweep(config).await
        }
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.log);
    info!("Configuration loaded");
    Ok(config)
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("ip_rotator={}", log.level).into());

    if log.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_manager(config: &Config) -> anyhow::Result<RotationManager> {
    let mut connector = ApiGatewayConnector::new(config.aws.credentials.clone());
    if let Some(endpoint) = &config.aws.gateway_endpoint {
        info!("Using gateway control plane at {}", endpoint);
        connector = connector.with_endpoint(endpoint.clone());
    }

    RotationManager::builder(config.rotator.target.clone(), Arc::new(connector))
        .regions(config.rotator.regions.clone())
        .retry_delay(config.retry_delay())
        .build()
        .context("Failed to build rotation manager")
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let manager = Arc::new(build_manager(&config)?);
    info!(
        "Starting IP Rotator for {} across {} regions",
        manager.target(),
        manager.regions().len()
    );

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let server = RelayServer::new(
        config.relay.clone(),
        RotatingClient::with_http_client(manager.clone(), http),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // A busy port fails here, before any endpoint exists
    let listener = server.bind().await.context("Failed to bind relay address")?;

    // Endpoints are deleted again whether the relay stops cleanly or fails
    let outcome = manager
        .with_active(|| server.serve(listener, shutdown_rx))
        .await
        .context("Failed to activate endpoints")?;
    if let Err(e) = &outcome.output {
        error!("Relay server error: {}", e);
    }
    outcome.teardown.context("Failed to delete endpoints")?;
    outcome.output.context("Relay server error")?;

    info!("IP Rotator stopped");
    Ok(())
}

async fn sweep(config: Config) -> anyhow::Result<()> {
    let manager = build_manager(&config)?;

    let mut total = 0;
    let mut failed = 0;
    for region in manager.regions().iter() {
        match manager.sweep_orphans(region).await {
            Ok(count) => {
                info!("Deleted {} gateways in {}", count, region);
                total += count;
            }
            Err(e) => {
                error!("Sweep of {} failed: {}", region, e);
                failed += 1;
            }
        }
    }

    info!("Sweep finished, {} gateways deleted", total);
    if failed > 0 {
        warn!("{} regions could not be swept", failed);
        bail!("Sweep failed in {} of {} regions", failed, manager.regions().len());
    }
    Ok(())
}

fn print_regions() {
    for preset in [RegionPreset::Default, RegionPreset::Extra, RegionPreset::All] {
        let regions = preset.regions();
        println!("{} ({}): {}", preset.as_str(), regions.len(), regions.join(", "));
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
