//! OS signal handling.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// Turns OS shutdown signals into cancellation of a shared token.
#[derive(Clone)]
pub(crate) struct SignalHandler {
    cancel: CancellationToken,
}

impl SignalHandler {
    /// Create a new signal handler cancelling `cancel`.
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Request shutdown.
    pub fn request_shutdown(&self) {
        self.cancel.cancel();
    }

    #[cfg(test)]
    fn is_shutdown_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Set up OS signal handlers (Unix only).
    #[cfg(unix)]
    pub fn install(&self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let sigterm_handler = self.clone();
        tokio::spawn(async move {
            if sigterm.recv().await.is_some() {
                info!("Received SIGTERM");
                sigterm_handler.request_shutdown();
            }
        });

        let mut sigint = signal(SignalKind::interrupt())?;
        let sigint_handler = self.clone();
        tokio::spawn(async move {
            if sigint.recv().await.is_some() {
                info!("Received SIGINT");
                sigint_handler.request_shutdown();
            }
        });

        info!("OS signal handlers installed (SIGTERM, SIGINT)");
        Ok(())
    }

    /// Set up OS signal handlers (non-Unix fallback).
    #[cfg(not(unix))]
    pub fn install(&self) -> std::io::Result<()> {
        let handler = self.clone();

        // Only Ctrl+C is available on non-Unix
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received Ctrl+C");
                handler.request_shutdown();
            }
        });

        info!("OS signal handlers installed (Ctrl+C only)");
        Ok(())
    }
}
