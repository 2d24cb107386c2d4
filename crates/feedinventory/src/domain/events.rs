//! Turns watch notifications into Subscription keys on the work queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use api_types::labels;
use api_types::FeedInventory;
use api_types::Manifest;
use api_types::Subscription;
use api_types::SubscriptionSpec;
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use tracing::debug;
use tracing::info;

use super::queue::WorkQueue;
use super::reconciler::object_key;
use super::selector::Selector;
use super::traits::ObjectLister;

/// Routes object changes to the queue.
///
/// Subscriptions are enqueued when first seen and whenever their spec
/// changes. A Manifest whose template changed enqueues every Subscription it
/// references through labels valued `Subscription`. A deleted FeedInventory
/// enqueues its owner so the inventory gets recreated.
pub struct EventRouter {
    queue: Arc<WorkQueue<String>>,
    lister: Arc<dyn ObjectLister>,
    seen_specs: Mutex<HashMap<String, SubscriptionSpec>>,
    seen_templates: Mutex<HashMap<String, RawExtension>>,
}

impl EventRouter {
    pub fn new(queue: Arc<WorkQueue<String>>, lister: Arc<dyn ObjectLister>) -> Self {
        Self {
            queue,
            lister,
            seen_specs: Mutex::new(HashMap::new()),
            seen_templates: Mutex::new(HashMap::new()),
        }
    }

    pub fn on_subscription_applied(&self, subscription: &Subscription) {
        let key = object_key(subscription);
        let previous = self
            .seen_specs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), subscription.spec.clone());

        match previous {
            None => debug!(key = %key, "Adding Subscription"),
            Some(old) if old == subscription.spec => return,
            Some(_) => debug!(key = %key, "Updating Subscription"),
        }
        self.queue.add(key);
    }

    pub fn on_subscription_deleted(&self, subscription: &Subscription) {
        let key = object_key(subscription);
        self.seen_specs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
        debug!(key = %key, "Subscription deleted");
    }

    pub fn on_manifest_applied(&self, manifest: &Manifest) {
        if manifest.metadata.deletion_timestamp.is_some() {
            return;
        }

        let key = object_key(manifest);
        let previous = self
            .seen_templates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), manifest.template.clone());
        if previous.as_ref() == Some(&manifest.template) {
            return;
        }
        debug!(manifest = %key, "Manifest template changed");

        let references = manifest
            .metadata
            .labels
            .iter()
            .flatten()
            .filter(|(_, value)| value.as_str() == labels::SUBSCRIPTION_KIND);
        for (label, _) in references {
            let selector = Selector::everything().with_equals(label, labels::SUBSCRIPTION_KIND);
            for subscription in self.lister.list_subscriptions(&selector) {
                self.queue.add(object_key(subscription.as_ref()));
            }
        }
    }

    pub fn on_manifest_deleted(&self, manifest: &Manifest) {
        self.seen_templates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&object_key(manifest));
    }

    pub fn on_feed_inventory_deleted(&self, inventory: &FeedInventory) {
        let key = object_key(inventory);
        info!(key = %key, "FeedInventory deleted, requeuing its Subscription");
        self.queue.add_rate_limited(key);
    }
}
