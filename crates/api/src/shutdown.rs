use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;
use tracing::info;

/// SIGTERM, SIGHUP and SIGINT, registered up front so setup errors surface
/// at startup.
pub struct Signals {
    sigterm: Signal,
    sighup: Signal,
    sigint: Signal,
}

impl Signals {
    pub fn register() -> io::Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sighup: signal(SignalKind::hangup())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for the first signal and flip `shutdown`.
    pub async fn forward(mut self, shutdown: watch::Sender<bool>) {
        let signal_name = tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sighup.recv() => "SIGHUP",
            _ = self.sigint.recv() => "SIGINT",
        };
        info!(signal = signal_name, "Received signal, shutting down gracefully...");
        let _ = shutdown.send(true);
    }
}

/// Resolves once `shutdown` is set or its sender is gone.
pub async fn triggered(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
