//! Worker pool draining the Subscription queue.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::queue::WorkQueue;
use super::reconciler::Reconciler;

pub struct Controller {
    queue: Arc<WorkQueue<String>>,
    reconciler: Arc<Reconciler>,
    workers: usize,
}

impl Controller {
    pub fn new(queue: Arc<WorkQueue<String>>, reconciler: Arc<Reconciler>, workers: usize) -> Self {
        Self {
            queue,
            reconciler,
            workers: workers.max(1),
        }
    }

    /// Runs the workers until `token` is cancelled, then stops the queue and
    /// waits for in-flight keys to finish.
    #[tracing::instrument(skip_all, fields(workers = self.workers))]
    pub async fn run(&self, token: CancellationToken) {
        info!("Starting workers");

        let mut workers = JoinSet::new();
        for _ in 0..self.workers {
            let queue = self.queue.clone();
            let reconciler = self.reconciler.clone();
            workers.spawn(async move { while process_next_item(&queue, &reconciler).await {} });
        }

        token.cancelled().await;
        info!("Shutting down workers");
        self.queue.shut_down_with_drain().await;

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!("Worker task failed: {e}");
            }
        }
        info!("Workers stopped");
    }
}

/// Takes one key off the queue and reconciles it. Returns false once the
/// queue has shut down.
pub async fn process_next_item(queue: &WorkQueue<String>, reconciler: &Reconciler) -> bool {
    let Some(key) = queue.get().await else {
        return false;
    };

    match reconciler.sync(&key).await {
        Ok(()) => {
            queue.forget(&key);
            info!(key = %key, "Successfully synced Subscription");
        }
        Err(e) => {
            warn!(
                key = %key,
                requeues = queue.num_requeues(&key),
                "Error syncing Subscription, requeuing: {e:?}"
            );
            queue.add_rate_limited(key.clone());
        }
    }

    queue.done(&key);
    true
}
