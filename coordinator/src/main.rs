//! Gavel auction coordinator binary.
//!
//! Hosts the sealed-round cricket player auction: accepts team
//! connections, runs one bidding round per catalog player, and settles
//! each sale against the team directory.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gavel_coordinator::{server, AuctionCoordinator, CoordinatorConfig};
use gavel_directory::PgDirectory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Gavel auction coordinator");

    let config = CoordinatorConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let node_id = config
        .node_id
        .clone()
        .unwrap_or_else(|| format!("coordinator-{}", uuid::Uuid::new_v4()));
    info!(node_id = %node_id, "Node ID assigned");

    let directory = Arc::new(PgDirectory::connect(&config.database_url).await?);
    let coordinator = Arc::new(AuctionCoordinator::new(config, directory));

    let listener = server::bind(&coordinator).await?;
    let accept_task = tokio::spawn(server::serve(listener, coordinator.clone()));

    tokio::select! {
        result = coordinator.run() => {
            match result {
                Ok(()) => info!("Auction complete"),
                Err(e) => {
                    error!(error = %e, "Auction aborted");
                    return Err(e.into());
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    accept_task.abort();
    info!("Coordinator shutdown complete");
    Ok(())
}
