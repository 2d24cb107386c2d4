use std::sync::Arc;

use api_types::FeedInventory;
use api_types::Manifest;
use api_types::Subscription;
use async_trait::async_trait;
use error_stack::Report;
use kube::api::PostParams;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::reflector::Store;
use kube::Api;
use kube::Client;
use kube::ResourceExt;

use crate::domain::selector::Selector;
use crate::domain::traits::FeedInventoryWriter;
use crate::domain::traits::ObjectLister;
use crate::domain::traits::StoreError;

/// Reflector-backed caches of Subscriptions and Manifests
#[derive(Clone)]
pub struct KubeObjectCache {
    subscriptions: Store<Subscription>,
    manifests: Store<Manifest>,
}

impl KubeObjectCache {
    pub(crate) fn new(subscriptions: Store<Subscription>, manifests: Store<Manifest>) -> Self {
        Self {
            subscriptions,
            manifests,
        }
    }
}

impl ObjectLister for KubeObjectCache {
    fn get_subscription(&self, namespace: &str, name: &str) -> Option<Arc<Subscription>> {
        let reference = ObjectRef::<Subscription>::new(name);
        let reference = if namespace.is_empty() {
            reference
        } else {
            reference.within(namespace)
        };
        self.subscriptions.get(&reference)
    }

    fn list_subscriptions(&self, selector: &Selector) -> Vec<Arc<Subscription>> {
        self.subscriptions
            .state()
            .into_iter()
            .filter(|s| selector.matches_meta(&s.metadata))
            .collect()
    }

    fn list_manifests(&self, namespace: &str, selector: &Selector) -> Vec<Arc<Manifest>> {
        self.manifests
            .state()
            .into_iter()
            .filter(|m| m.metadata.namespace.as_deref() == Some(namespace))
            .filter(|m| selector.matches_meta(&m.metadata))
            .collect()
    }
}

/// Writes FeedInventories through the API server
#[derive(Clone)]
pub struct KubeFeedInventoryWriter {
    client: Client,
}

impl KubeFeedInventoryWriter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<FeedInventory> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl FeedInventoryWriter for KubeFeedInventoryWriter {
    async fn create(&self, inventory: &FeedInventory) -> Result<FeedInventory, Report<StoreError>> {
        let namespace = inventory.namespace().unwrap_or_default();
        self.api(&namespace)
            .create(&PostParams::default(), inventory)
            .await
            .map_err(|e| store_error(e, &namespace, &inventory.name_any()))
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<FeedInventory, Report<StoreError>> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| store_error(e, namespace, name))
    }

    async fn replace(&self, inventory: &FeedInventory) -> Result<FeedInventory, Report<StoreError>> {
        let namespace = inventory.namespace().unwrap_or_default();
        let name = inventory.name_any();
        self.api(&namespace)
            .replace(&name, &PostParams::default(), inventory)
            .await
            .map_err(|e| store_error(e, &namespace, &name))
    }
}

/// Maps API failures onto the store error kinds the reconciler acts on.
fn store_error(err: kube::Error, namespace: &str, name: &str) -> Report<StoreError> {
    let key = format!("{namespace}/{name}");
    let context = match &err {
        kube::Error::Api(response) if response.code == 409 && response.reason == "AlreadyExists" => {
            StoreError::AlreadyExists { key }
        }
        kube::Error::Api(response) if response.code == 409 => StoreError::Conflict { key },
        kube::Error::Api(response) if response.code == 404 => StoreError::NotFound { key },
        other => StoreError::Api {
            key,
            message: other.to_string(),
        },
    };
    Report::new(context).attach_printable(format!("Kubernetes API error: {err}"))
}
