//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::errors::DeployError;
use crate::server::serve::serve;
use crate::server::state::ServerState;

/// Run the deployments app until `shutdown_signal` resolves
pub async fn run(
    version: String,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), DeployError> {
    info!("Initializing deployments app {}...", version);

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

    let app_state = AppState::init(&options)?;
    let server_state = Arc::new(ServerState::new(app_state.webhooks.clone()));

    let server_handle = serve(&options.server, server_state, async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(options.max_shutdown_delay, server_handle).await {
        Ok(joined) => {
            joined.map_err(|e| DeployError::Server(e.to_string()))??;
            info!("Shutdown complete");
            Ok(())
        }
        Err(_) => {
            error!(
                "Shutdown timed out after {:?}, dropping open connections",
                options.max_shutdown_delay
            );
            Err(DeployError::Server("shutdown timed out".to_string()))
        }
    }
}
