//! Graceful cancellation on SIGINT and SIGTERM.
//!
//! Cancelling a batch never abandons a file mid-write: transactions past
//! their write step finish verifying or rolling back before the process
//! winds down.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Wait for a termination signal, then cancel the batch
pub async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), cancelling batch...");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling batch...");
        }
    }

    cancel.cancel();
}
