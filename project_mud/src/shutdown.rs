use tokio::sync::watch;

/// Held by main; flipping it stops every subsystem.
#[derive(Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

/// Cloned into each subsystem that has to stop on shutdown.
#[derive(Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

impl ShutdownTx {
    pub fn trigger(&self) {
        self.0.send_replace(true);
    }
}

impl ShutdownRx {
    /// Resolves once shutdown is triggered or the sender is gone.
    pub async fn wait(&mut self) {
        while !*self.0.borrow() {
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }

    /// Polled by the tick thread between ticks.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// The raw receiver, for the dispatcher.
    pub fn into_inner(self) -> watch::Receiver<bool> {
        self.0
    }
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigint, mut sigterm) = match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(int), Ok(term)) => (int, term),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!("cannot listen for signals: {}", e);
                std::future::pending::<()>().await;
                return;
            }
        };
        tokio::select! {
            _ = sigint.recv() => tracing::info!("Received SIGINT"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C"),
            Err(e) => {
                tracing::error!("cannot listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
}
