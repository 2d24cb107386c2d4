//! In-memory test adapters for the cluster-facing traits

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use api_types::labels;
use api_types::Feed;
use api_types::FeedInventory;
use api_types::Manifest;
use api_types::SchedulingStrategy;
use api_types::Subscription;
use api_types::SubscriptionSpec;
use async_trait::async_trait;
use error_stack::Report;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;

use super::predictor::PredictorError;
use super::reconciler::object_key;
use super::selector::Selector;
use super::traits::FeedInventoryWriter;
use super::traits::NodeLister;
use super::traits::ObjectLister;
use super::traits::StoreError;

/// Fake API server holding Subscriptions, Manifests and FeedInventories
#[derive(Default)]
pub struct FakeCluster {
    subscriptions: Mutex<BTreeMap<String, Arc<Subscription>>>,
    manifests: Mutex<BTreeMap<String, Arc<Manifest>>>,
    inventories: Mutex<BTreeMap<String, FeedInventory>>,
    next_version: AtomicU64,
    creates: AtomicUsize,
    replaces: AtomicUsize,
    conflict_next: AtomicBool,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subscription(&self, subscription: Subscription) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(object_key(&subscription), Arc::new(subscription));
    }

    /// Adds or replaces a Manifest by name
    pub fn add_manifest(&self, manifest: Manifest) {
        self.manifests
            .lock()
            .unwrap()
            .insert(object_key(&manifest), Arc::new(manifest));
    }

    pub fn inventory(&self, namespace: &str, name: &str) -> Option<FeedInventory> {
        self.inventories
            .lock()
            .unwrap()
            .get(&format!("{namespace}/{name}"))
            .cloned()
    }

    /// Deletes an inventory as a user or garbage collector would
    pub fn remove_inventory(&self, namespace: &str, name: &str) -> Option<FeedInventory> {
        self.inventories
            .lock()
            .unwrap()
            .remove(&format!("{namespace}/{name}"))
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn replace_count(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    /// The next replace fails as if another writer got there first
    pub fn conflict_on_next_replace(&self) {
        self.conflict_next.store(true, Ordering::SeqCst);
    }

    fn bump_version(&self) -> String {
        (self.next_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

impl ObjectLister for FakeCluster {
    fn get_subscription(&self, namespace: &str, name: &str) -> Option<Arc<Subscription>> {
        let key = if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}/{name}")
        };
        self.subscriptions.lock().unwrap().get(&key).cloned()
    }

    fn list_subscriptions(&self, selector: &Selector) -> Vec<Arc<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| selector.matches_meta(&s.metadata))
            .cloned()
            .collect()
    }

    fn list_manifests(&self, namespace: &str, selector: &Selector) -> Vec<Arc<Manifest>> {
        self.manifests
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.metadata.namespace.as_deref() == Some(namespace))
            .filter(|m| selector.matches_meta(&m.metadata))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl FeedInventoryWriter for FakeCluster {
    async fn create(&self, inventory: &FeedInventory) -> Result<FeedInventory, Report<StoreError>> {
        let key = object_key(inventory);
        let mut inventories = self.inventories.lock().unwrap();
        if inventories.contains_key(&key) {
            return Err(Report::new(StoreError::AlreadyExists { key }));
        }
        let mut stored = inventory.clone();
        stored.metadata.resource_version = Some(self.bump_version());
        inventories.insert(key, stored.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<FeedInventory, Report<StoreError>> {
        self.inventory(namespace, name).ok_or_else(|| {
            Report::new(StoreError::NotFound {
                key: format!("{namespace}/{name}"),
            })
        })
    }

    async fn replace(&self, inventory: &FeedInventory) -> Result<FeedInventory, Report<StoreError>> {
        let key = object_key(inventory);
        let mut inventories = self.inventories.lock().unwrap();
        let Some(current) = inventories.get(&key) else {
            return Err(Report::new(StoreError::NotFound { key }));
        };
        if self.conflict_next.swap(false, Ordering::SeqCst)
            || current.metadata.resource_version != inventory.metadata.resource_version
        {
            return Err(Report::new(StoreError::Conflict { key }));
        }
        let mut stored = inventory.clone();
        stored.metadata.resource_version = Some(self.bump_version());
        inventories.insert(key, stored.clone());
        self.replaces.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}

/// Fixed node list with a toggleable sync flag
pub struct StaticNodes {
    nodes: Vec<Arc<Node>>,
    synced: AtomicBool,
}

impl StaticNodes {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes: nodes.into_iter().map(Arc::new).collect(),
            synced: AtomicBool::new(true),
        }
    }

    pub fn unsynced() -> Self {
        let nodes = Self::new(Vec::new());
        nodes.synced.store(false, Ordering::SeqCst);
        nodes
    }
}

impl NodeLister for StaticNodes {
    fn list_nodes(&self, selector: &Selector) -> Result<Vec<Arc<Node>>, Report<PredictorError>> {
        if !self.has_synced() {
            return Err(Report::new(PredictorError::CacheNotSynced));
        }
        Ok(self
            .nodes
            .iter()
            .filter(|n| selector.matches_meta(&n.metadata))
            .cloned()
            .collect())
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

pub fn feed(kind: &str, api_version: &str, namespace: &str, name: &str) -> Feed {
    Feed {
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        namespace: Some(namespace.to_string()),
        name: Some(name.to_string()),
        feed_selector: None,
    }
}

pub fn subscription(
    namespace: &str,
    name: &str,
    scheduling_strategy: SchedulingStrategy,
    feeds: Vec<Feed>,
) -> Subscription {
    let mut subscription = Subscription::new(
        name,
        SubscriptionSpec {
            scheduling_strategy,
            feeds,
        },
    );
    subscription.metadata.namespace = Some(namespace.to_string());
    subscription.metadata.uid = Some(format!("uid-{namespace}-{name}"));
    subscription
}

/// A Manifest in the reserved namespace wrapping an `apps/v1` Deployment
/// whose single container requests `cpu`.
pub fn deployment_manifest(namespace: &str, name: &str, replicas: Option<i32>, cpu: &str) -> Manifest {
    let mut spec = serde_json::json!({
        "template": {
            "spec": {
                "containers": [{"name": name, "resources": {"requests": {"cpu": cpu}}}]
            }
        }
    });
    if let Some(replicas) = replicas {
        spec["replicas"] = serde_json::json!(replicas);
    }

    Manifest {
        metadata: ObjectMeta {
            name: Some(format!("apps-v1.deployment.{namespace}.{name}")),
            namespace: Some(api_types::RESERVED_NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([
                (labels::CONFIG_GROUP.to_string(), "apps".to_string()),
                (labels::CONFIG_VERSION.to_string(), "v1".to_string()),
                (labels::CONFIG_KIND.to_string(), "Deployment".to_string()),
                (labels::CONFIG_NAME.to_string(), name.to_string()),
                (labels::CONFIG_NAMESPACE.to_string(), namespace.to_string()),
            ])),
            ..Default::default()
        },
        template: RawExtension(serde_json::json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": name, "namespace": namespace},
            "spec": spec
        })),
    }
}
