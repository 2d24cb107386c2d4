use std::sync::Arc;

use anyhow::Result;
use tracing::error;

use crate::api::PredictorServer;
use crate::app::Tasks;
use crate::config::PredictorArgs;
use crate::domain::predictor::CapacityPredictor;
use crate::domain::predictor::EstimateOptions;
use crate::infrastructure::k8s::NodeCache;
use crate::infrastructure::kube_client::init_kube_client;

/// Serves capacity estimates until a shutdown signal arrives.
pub async fn run(args: PredictorArgs) -> Result<()> {
    let client = init_kube_client(args.kube.kubeconfig.clone(), args.kube.master.clone())
        .await
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;

    let (node_cache, node_watcher) = NodeCache::new(client);
    let predictor = Arc::new(CapacityPredictor::new(
        Arc::new(node_cache),
        EstimateOptions::from(&args),
    ));
    let server = PredictorServer::new(predictor, args.listen_addr());

    let mut tasks = Tasks::new();
    let token = tasks.token();

    tasks.spawn("node watcher", node_watcher.run(token.clone()));
    tasks.spawn("predictor server", async move {
        if let Err(e) = server.run(token).await {
            error!("Predictor server failed: {e:?}");
        }
    });

    tasks.wait_for_completion().await
}
