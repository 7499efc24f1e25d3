//! TCP listener: accepts team connections and spawns a session task per
//! connection.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use gavel_common::{AuctionError, Result};

use crate::coordinator::AuctionCoordinator;
use crate::session::run_session;

/// Bind the coordinator's listen address.
pub async fn bind(coordinator: &AuctionCoordinator) -> Result<TcpListener> {
    let addr = format!(
        "{}:{}",
        coordinator.config().listen_addr,
        coordinator.config().listen_port
    );
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AuctionError::Configuration(format!("cannot bind {addr}: {e}")))?;
    info!(%addr, "Listening for team connections");
    Ok(listener)
}

/// Accept connections until the task is cancelled.
///
/// Admission control happens inside the session after the registration
/// dialogue, not here: a connection beyond capacity still deserves its
/// rejection message.
pub async fn serve(listener: TcpListener, coordinator: Arc<AuctionCoordinator>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!(%peer, "Connection accepted");
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    if let Err(e) = run_session(stream, coordinator).await {
                        warn!(%peer, error = %e, "Session ended with error");
                    }
                });
            }
            Err(e) => {
                // Transient accept errors (EMFILE, resets) should not
                // kill the listener.
                error!(error = %e, "Accept failed");
            }
        }
    }
}
