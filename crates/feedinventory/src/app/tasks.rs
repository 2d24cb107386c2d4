use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Task manager, responsible for starting and stopping background tasks
pub struct Tasks {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    cancellation_token: CancellationToken,
}

impl Default for Tasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Tasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Token cancelled when shutdown begins
    pub fn token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tracing::info!("Starting {name} task");
            task.await;
            tracing::info!("{name} task completed");
        });
        self.tasks.push((name, handle));
    }

    /// Wait for a shutdown signal, or for any task to stop on its own.
    ///
    /// Either way every task is cancelled and awaited. A task that stops
    /// before shutdown was requested is reported as an error.
    pub async fn wait_for_completion(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    async fn run_until<S>(mut self, signal: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        if self.tasks.is_empty() {
            return Ok(());
        }

        let names: Vec<&'static str> = self.tasks.iter().map(|(name, _)| *name).collect();
        let outcome = tokio::select! {
            () = signal => {
                tracing::info!("Shutdown signal received, cancelling all tasks");
                Ok(())
            }
            (result, index, _) = futures::future::select_all(self.tasks.iter_mut().map(|(_, handle)| handle)) => {
                let name = names[index];
                match result {
                    Ok(()) => tracing::warn!("{name} task completed unexpectedly"),
                    Err(e) => tracing::error!("{name} task failed: {e}"),
                }
                Err(anyhow::anyhow!("{name} task stopped before shutdown"))
            }
        };

        self.cancellation_token.cancel();
        self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;
        outcome
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for (name, task) in &mut self.tasks {
                if task.is_finished() {
                    continue;
                }
                if let Err(e) = task.await {
                    tracing::error!("{name} task failed during shutdown: {e}");
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }
}

/// Resolves on SIGTERM or SIGINT.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::signal;
        use tokio::signal::unix::SignalKind;

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT, initiating graceful shutdown");
                    }
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!("Failed to install signal handlers, falling back to Ctrl+C: {e}");
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(e) => {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
