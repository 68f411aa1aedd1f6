use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Translates SIGINT/SIGTERM into cancellation of the replication job.
///
/// Cancelling the token makes full-load workers stop after their current
/// range and the apply engine drain its buffer and write one final
/// checkpoint, so a signal never loses applied-but-uncheckpointed work.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self { cancel_token }
    }

    pub fn register_handlers(&self) {
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            let signal_name = wait_for_shutdown_signal().await;
            info!(
                signal = signal_name,
                "shutdown requested; draining in-flight batches and writing final checkpoint"
            );
            cancel_token.cancel();
        });
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> &'static str {
    let interrupt = signal::ctrl_c();

    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = interrupt => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
            }
        }
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable, listening for Ctrl+C only");
            let _ = interrupt.await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> &'static str {
    let _ = signal::ctrl_c().await;
    "SIGINT"
}
