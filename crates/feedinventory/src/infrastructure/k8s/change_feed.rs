use std::sync::Arc;

use api_types::FeedInventory;
use api_types::Manifest;
use api_types::Subscription;
use futures::StreamExt;
use kube::runtime::reflector;
use kube::runtime::reflector::store::Writer;
use kube::runtime::watcher;
use kube::runtime::WatchStreamExt;
use kube::Api;
use kube::Client;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::cluster_state::KubeObjectCache;
use super::watch::run_watch;
use crate::domain::events::EventRouter;

/// Watches Subscriptions, Manifests and FeedInventories and forwards every
/// change to an [`EventRouter`].
pub struct ChangeFeed {
    client: Client,
    reserved_namespace: String,
    subscriptions: Writer<Subscription>,
    manifests: Writer<Manifest>,
    subscriptions_synced: watch::Sender<bool>,
    manifests_synced: watch::Sender<bool>,
}

/// Resolves once every cache behind a [`ChangeFeed`] has listed its objects.
pub struct CacheSync {
    receivers: Vec<watch::Receiver<bool>>,
}

impl CacheSync {
    /// Returns false if a watcher stopped before syncing.
    pub async fn wait(mut self) -> bool {
        for receiver in &mut self.receivers {
            if receiver.wait_for(|synced| *synced).await.is_err() {
                return false;
            }
        }
        true
    }
}

impl ChangeFeed {
    /// Creates the feed along with the caches it fills and their sync handle.
    pub fn new(client: Client, reserved_namespace: String) -> (Self, KubeObjectCache, CacheSync) {
        let (subscription_store, subscriptions) = reflector::store();
        let (manifest_store, manifests) = reflector::store();
        let (subscriptions_synced, subscriptions_rx) = watch::channel(false);
        let (manifests_synced, manifests_rx) = watch::channel(false);

        let feed = Self {
            client,
            reserved_namespace,
            subscriptions,
            manifests,
            subscriptions_synced,
            manifests_synced,
        };
        let cache = KubeObjectCache::new(subscription_store, manifest_store);
        let sync = CacheSync {
            receivers: vec![subscriptions_rx, manifests_rx],
        };
        (feed, cache, sync)
    }

    #[tracing::instrument(skip_all, fields(reserved_namespace = %self.reserved_namespace))]
    pub async fn run(self, router: Arc<EventRouter>, token: CancellationToken) {
        info!("Starting change feed");

        let subscriptions = reflector(
            self.subscriptions,
            watcher(
                Api::<Subscription>::all(self.client.clone()),
                watcher::Config::default(),
            )
            .default_backoff(),
        )
        .boxed();
        let manifests = reflector(
            self.manifests,
            watcher(
                Api::<Manifest>::namespaced(self.client.clone(), &self.reserved_namespace),
                watcher::Config::default(),
            )
            .default_backoff(),
        )
        .boxed();
        let inventories = watcher(
            Api::<FeedInventory>::all(self.client),
            watcher::Config::default(),
        )
        .default_backoff()
        .boxed();

        tokio::join!(
            run_watch(
                subscriptions,
                Some(self.subscriptions_synced),
                |event| route_subscription_event(&router, event),
                token.clone(),
            ),
            run_watch(
                manifests,
                Some(self.manifests_synced),
                |event| route_manifest_event(&router, event),
                token.clone(),
            ),
            run_watch(
                inventories,
                None,
                |event| route_feed_inventory_event(&router, event),
                token,
            ),
        );
        info!("Change feed stopped");
    }
}

fn route_subscription_event(router: &EventRouter, event: watcher::Event<Subscription>) {
    match event {
        watcher::Event::Applied(subscription) => router.on_subscription_applied(&subscription),
        watcher::Event::Deleted(subscription) => router.on_subscription_deleted(&subscription),
        watcher::Event::Restarted(subscriptions) => subscriptions
            .iter()
            .for_each(|subscription| router.on_subscription_applied(subscription)),
    }
}

fn route_manifest_event(router: &EventRouter, event: watcher::Event<Manifest>) {
    match event {
        watcher::Event::Applied(manifest) => router.on_manifest_applied(&manifest),
        watcher::Event::Deleted(manifest) => router.on_manifest_deleted(&manifest),
        watcher::Event::Restarted(manifests) => manifests
            .iter()
            .for_each(|manifest| router.on_manifest_applied(manifest)),
    }
}

fn route_feed_inventory_event(router: &EventRouter, event: watcher::Event<FeedInventory>) {
    if let watcher::Event::Deleted(inventory) = event {
        router.on_feed_inventory_deleted(&inventory);
    }
}

#[cfg(test)]
mod tests {
    use api_types::FeedInventorySpec;
    use api_types::SchedulingStrategy;
    use api_types::SubscriptionSpec;

    use super::*;
    use crate::domain::queue::ExponentialBackoff;
    use crate::domain::queue::WorkQueue;

    fn router() -> (Arc<WorkQueue<String>>, EventRouter) {
        let (store, _writer) = reflector::store();
        let (manifest_store, _manifest_writer) = reflector::store();
        let queue = Arc::new(WorkQueue::new(ExponentialBackoff::default()));
        let cache = Arc::new(KubeObjectCache::new(store, manifest_store));
        (queue.clone(), EventRouter::new(queue, cache))
    }

    fn subscription(name: &str) -> Subscription {
        let mut subscription = Subscription::new(
            name,
            SubscriptionSpec {
                scheduling_strategy: SchedulingStrategy::Dividing,
                feeds: Vec::new(),
            },
        );
        subscription.metadata.namespace = Some("default".to_string());
        subscription
    }

    #[tokio::test]
    async fn relisted_subscriptions_are_enqueued() {
        let (queue, router) = router();

        route_subscription_event(
            &router,
            watcher::Event::Restarted(vec![subscription("a"), subscription("b")]),
        );

        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn only_inventory_deletions_are_routed() {
        let (queue, router) = router();
        let mut inventory = FeedInventory::new("a", FeedInventorySpec::default());
        inventory.metadata.namespace = Some("default".to_string());

        route_feed_inventory_event(&router, watcher::Event::Applied(inventory.clone()));
        assert_eq!(queue.num_requeues(&"default/a".to_string()), 0);

        route_feed_inventory_event(&router, watcher::Event::Deleted(inventory));
        assert_eq!(queue.num_requeues(&"default/a".to_string()), 1);
    }

    #[tokio::test]
    async fn cache_sync_fails_when_watcher_is_gone() {
        let (tx, rx) = watch::channel(false);
        drop(tx);

        assert!(!CacheSync { receivers: vec![rx] }.wait().await);
    }

    #[tokio::test]
    async fn cache_sync_waits_for_every_cache() {
        let (first_tx, first_rx) = watch::channel(false);
        let (second_tx, second_rx) = watch::channel(false);
        let sync = tokio::spawn(
            CacheSync {
                receivers: vec![first_rx, second_rx],
            }
            .wait(),
        );

        first_tx.send_replace(true);
        tokio::task::yield_now().await;
        assert!(!sync.is_finished());

        second_tx.send_replace(true);
        assert!(sync.await.expect("sync task should not panic"));
    }
}
