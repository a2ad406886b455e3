//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for Ctrl+C (and SIGTERM on Unix)
//! - Translate the first one into a `Shutdown` trigger

use std::future::Future;

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

/// Spawn a task that triggers `shutdown` on Ctrl+C or SIGTERM.
pub fn spawn_signal_handler(shutdown: Shutdown) -> JoinHandle<()> {
    trigger_on(shutdown, terminate_signal())
}

/// Spawn a task that triggers `shutdown` once `signal` resolves.
pub fn trigger_on<F>(shutdown: Shutdown, signal: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        signal.await;
        tracing::info!(subscribers = shutdown.receiver_count(), "Shutdown signal received");
        shutdown.trigger();
    })
}

async fn terminate_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_signal_triggers_shutdown() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let (fire, fired) = oneshot::channel::<()>();

        let task = trigger_on(shutdown.clone(), async move {
            let _ = fired.await;
        });
        fire.send(()).unwrap();

        assert!(rx.recv().await.is_ok());
        task.await.unwrap();
    }
}
