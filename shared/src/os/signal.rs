//! Shutdown signal handling, shared by the controller and agent binaries.

use log::trace;

/// Resolves when SIGINT or SIGTERM is received.
pub async fn shutdown() {
    imp::shutdown().await
}

#[cfg(unix)]
mod imp {
    use super::trace;
    use tokio::signal::unix::{signal, SignalKind};

    pub(super) async fn shutdown() {
        let mut sigint =
            signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => trace!("received SIGINT, starting shutdown"),
            _ = sigterm.recv() => trace!("received SIGTERM, starting shutdown"),
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use super::trace;

    pub(super) async fn shutdown() {
        let _ = tokio::signal::ctrl_c().await;
        trace!("received ctrl-c, starting shutdown");
    }
}
