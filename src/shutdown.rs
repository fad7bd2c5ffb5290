//! Turns SIGINT/SIGTERM into a [`CancellationToken`].
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

async fn terminate() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(error) => {
                warn!(%error, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    }

    #[cfg(not(unix))]
    std::future::pending::<()>().await;
}

/// Spawns a task that cancels the returned token on the first SIGINT or
/// SIGTERM.
pub fn install() -> CancellationToken {
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                res = signal::ctrl_c() => match res {
                    Ok(()) => info!("received SIGINT, shutting down"),
                    Err(error) => {
                        warn!(%error, "something strange with ctrl-c handling!")
                    },
                },
                _ = terminate() => info!("received SIGTERM, shutting down"),
            }
            cancel.cancel();
        });
    }

    cancel
}
