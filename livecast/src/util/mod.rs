use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

/// Resolve once the shutdown flag is set (or its sender is gone).
pub async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    while !*shutdown_rx.borrow_and_update() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `duration` unless shutdown arrives first. Returns `false` on shutdown.
pub async fn sleep_or_shutdown(duration: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown_requested(shutdown_rx) => false,
    }
}

/// Drive `future` to completion unless shutdown arrives first; the future is dropped then.
pub async fn unless_shutdown<F: Future>(
    future: F,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Option<F::Output> {
    tokio::select! {
        output = future => Some(output),
        _ = shutdown_requested(shutdown_rx) => None,
    }
}
