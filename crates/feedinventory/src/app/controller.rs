use std::sync::Arc;

use anyhow::Result;
use tracing::error;
use tracing::info;

use crate::app::Tasks;
use crate::config::ControllerArgs;
use crate::domain::controller::Controller;
use crate::domain::events::EventRouter;
use crate::domain::queue::ExponentialBackoff;
use crate::domain::queue::WorkQueue;
use crate::domain::reconciler::Reconciler;
use crate::domain::reconciler::ReconcilerConfig;
use crate::domain::registry::Registry;
use crate::domain::traits::ObjectLister;
use crate::infrastructure::k8s::ChangeFeed;
use crate::infrastructure::k8s::KubeFeedInventoryWriter;
use crate::infrastructure::kube_client::init_kube_client;

/// Runs the FeedInventory controller until a shutdown signal arrives.
pub async fn run(args: ControllerArgs) -> Result<()> {
    let client = init_kube_client(args.kube.kubeconfig.clone(), args.kube.master.clone())
        .await
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;

    let registry = Arc::new(Registry::with_defaults());
    info!(plugins = registry.len(), "Registered workload plugins");

    let (change_feed, cache, cache_sync) =
        ChangeFeed::new(client.clone(), args.reserved_namespace.clone());
    let lister: Arc<dyn ObjectLister> = Arc::new(cache);
    let reconciler = Arc::new(Reconciler::new(
        lister.clone(),
        Arc::new(KubeFeedInventoryWriter::new(client)),
        registry,
        ReconcilerConfig::from(&args),
    ));
    let queue = Arc::new(WorkQueue::new(ExponentialBackoff::default()));
    let router = Arc::new(EventRouter::new(queue.clone(), lister));
    let controller = Controller::new(queue, reconciler, args.workers);

    let mut tasks = Tasks::new();
    let token = tasks.token();

    tasks.spawn("change feed", change_feed.run(router, token.clone()));
    tasks.spawn("controller", async move {
        info!("Waiting for informer caches to sync");
        tokio::select! {
            synced = cache_sync.wait() => {
                if !synced {
                    error!("Informer caches stopped before syncing");
                    return;
                }
            }
            () = token.cancelled() => return,
        }
        info!("Informer caches synced");
        controller.run(token).await;
    });

    tasks.wait_for_completion().await
}
