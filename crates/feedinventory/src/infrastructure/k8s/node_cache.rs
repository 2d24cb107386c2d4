use std::sync::Arc;

use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::runtime::reflector;
use kube::runtime::reflector::store::Writer;
use kube::runtime::reflector::Store;
use kube::runtime::watcher;
use kube::runtime::WatchStreamExt;
use kube::Api;
use kube::Client;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::watch::run_watch;
use crate::domain::predictor::PredictorError;
use crate::domain::selector::Selector;
use crate::domain::traits::NodeLister;

/// Cluster-wide Node cache fed by [`NodeWatcher`]
#[derive(Clone)]
pub struct NodeCache {
    store: Store<Node>,
    synced: watch::Receiver<bool>,
}

impl NodeCache {
    /// Creates an empty cache and the watcher that fills it.
    pub fn new(client: Client) -> (Self, NodeWatcher) {
        let (store, writer) = reflector::store();
        let (synced_tx, synced_rx) = watch::channel(false);
        (
            Self {
                store,
                synced: synced_rx,
            },
            NodeWatcher {
                client,
                writer,
                synced: synced_tx,
            },
        )
    }
}

impl NodeLister for NodeCache {
    fn list_nodes(&self, selector: &Selector) -> Result<Vec<Arc<Node>>, Report<PredictorError>> {
        if !self.has_synced() {
            return Err(Report::new(PredictorError::CacheNotSynced));
        }
        Ok(self
            .store
            .state()
            .into_iter()
            .filter(|node| selector.matches_meta(&node.metadata))
            .collect())
    }

    fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }
}

pub struct NodeWatcher {
    client: Client,
    writer: Writer<Node>,
    synced: watch::Sender<bool>,
}

impl NodeWatcher {
    pub async fn run(self, token: CancellationToken) {
        let api: Api<Node> = Api::all(self.client);
        let stream = reflector(
            self.writer,
            watcher(api, watcher::Config::default()).default_backoff(),
        )
        .boxed();

        run_watch(stream, Some(self.synced), |_| {}, token).await;
    }
}
