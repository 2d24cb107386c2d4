//! Builds the FeedInventory of one Subscription.

use core::error::Error;
use std::collections::BTreeMap;
use std::sync::Arc;

use api_types::labels;
use api_types::Feed;
use api_types::FeedInventory;
use api_types::FeedInventorySpec;
use api_types::FeedOrder;
use api_types::SchedulingStrategy;
use api_types::Subscription;
use error_stack::Report;
use error_stack::ResultExt;
use kube::Resource;
use kube::ResourceExt;
use tokio::task::JoinError;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::registry::GroupVersionKind;
use super::registry::ParsedWorkload;
use super::registry::Registry;
use super::selector::Selector;
use super::traits::FeedInventoryWriter;
use super::traits::ObjectLister;
use super::traits::StoreError;

#[derive(Debug, derive_more::Display)]
pub enum ReconcileError {
    #[display("Failed to write FeedInventory {key}")]
    Upsert { key: String },
}

impl Error for ReconcileError {}

/// Reasons a single feed falls back to a selector-only order.
#[derive(Debug, derive_more::Display)]
pub enum ResolveError {
    #[display("Invalid feed selector for {feed}")]
    InvalidSelector { feed: String },
    #[display("No manifest matches feed {feed}")]
    ManifestNotFound { feed: String },
    #[display("Manifest {manifest} has an unreadable template")]
    InvalidTemplate { manifest: String },
    #[display("No plugin registered for {gvk}")]
    NoPlugin { gvk: String },
    #[display("Plugin {plugin} failed to parse manifest {manifest}")]
    Parse { plugin: String, manifest: String },
}

impl Error for ResolveError {}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Namespace holding the Manifests
    pub reserved_namespace: String,
    /// Upper bound on feeds resolved at once for one Subscription
    pub feed_concurrency: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            reserved_namespace: api_types::RESERVED_NAMESPACE.to_string(),
            feed_concurrency: 8,
        }
    }
}

/// Splits a `namespace/name` key. A key without a slash has an empty namespace.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let mut parts = key.split('/');
    let (namespace, name) = match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, None) => ("", name),
        (Some(namespace), Some(name), None) => (namespace, name),
        _ => return None,
    };
    (!name.is_empty()).then_some((namespace, name))
}

/// The queue key of a namespaced object.
pub fn object_key<K: Resource>(obj: &K) -> String {
    match obj.meta().namespace.as_deref() {
        Some(namespace) if !namespace.is_empty() => {
            format!("{namespace}/{}", obj.meta().name.as_deref().unwrap_or_default())
        }
        _ => obj.meta().name.clone().unwrap_or_default(),
    }
}

pub struct Reconciler {
    writer: Arc<dyn FeedInventoryWriter>,
    resolver: FeedResolver,
    feed_concurrency: usize,
}

impl Reconciler {
    pub fn new(
        lister: Arc<dyn ObjectLister>,
        writer: Arc<dyn FeedInventoryWriter>,
        registry: Arc<Registry>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            writer,
            resolver: FeedResolver {
                lister,
                registry,
                reserved_namespace: config.reserved_namespace.into(),
            },
            feed_concurrency: config.feed_concurrency.max(1),
        }
    }

    /// Brings the FeedInventory of the Subscription named by `key` in line
    /// with the current Manifests.
    ///
    /// Malformed keys, missing or terminating Subscriptions and strategies
    /// other than Dividing are not errors. Only a failed write is returned, so
    /// the caller can retry the key.
    #[tracing::instrument(skip(self))]
    pub async fn sync(&self, key: &str) -> Result<(), Report<ReconcileError>> {
        let Some((namespace, name)) = split_key(key) else {
            error!("Invalid resource key");
            return Ok(());
        };

        let Some(subscription) = self.resolver.lister.get_subscription(namespace, name) else {
            debug!("Subscription no longer exists");
            return Ok(());
        };

        if subscription.metadata.deletion_timestamp.is_some() {
            debug!("Subscription is being deleted");
            return Ok(());
        }

        if subscription.spec.scheduling_strategy != SchedulingStrategy::Dividing {
            debug!(
                strategy = ?subscription.spec.scheduling_strategy,
                "Skipping Subscription without Dividing strategy"
            );
            return Ok(());
        }

        let mut inventory = inventory_for(&subscription);
        inventory.spec.feeds = self.resolve_feeds(&subscription.spec.feeds).await;

        self.upsert(inventory)
            .await
            .change_context(ReconcileError::Upsert {
                key: key.to_string(),
            })
    }

    /// Resolves every feed on a bounded set of blocking tasks. Each result is
    /// written back at its feed's index, so output order equals input order.
    async fn resolve_feeds(&self, feeds: &[Feed]) -> Vec<FeedOrder> {
        let mut orders: Vec<FeedOrder> = feeds.iter().cloned().map(FeedOrder::selector_only).collect();
        let mut tasks = JoinSet::new();

        for (index, feed) in feeds.iter().cloned().enumerate() {
            if tasks.len() >= self.feed_concurrency {
                if let Some(joined) = tasks.join_next().await {
                    store_order(&mut orders, joined);
                }
            }
            let resolver = self.resolver.clone();
            tasks.spawn_blocking(move || (index, resolver.resolve(feed)));
        }

        while let Some(joined) = tasks.join_next().await {
            store_order(&mut orders, joined);
        }

        orders
    }

    /// Create, falling back to get-then-replace when the object exists.
    async fn upsert(&self, mut inventory: FeedInventory) -> Result<(), Report<StoreError>> {
        match self.writer.create(&inventory).await {
            Ok(_) => {
                info!(feeds = inventory.spec.feeds.len(), "Created FeedInventory");
                Ok(())
            }
            Err(report) if matches!(report.current_context(), StoreError::AlreadyExists { .. }) => {
                let namespace = inventory.namespace().unwrap_or_default();
                let name = inventory.name_any();
                let current = self.writer.get(&namespace, &name).await?;
                inventory.metadata.resource_version = current.metadata.resource_version;
                self.writer.replace(&inventory).await?;
                info!(feeds = inventory.spec.feeds.len(), "Updated FeedInventory");
                Ok(())
            }
            Err(report) => Err(report),
        }
    }
}

fn store_order(orders: &mut [FeedOrder], joined: Result<(usize, Option<FeedOrder>), JoinError>) {
    match joined {
        Ok((index, Some(order))) => orders[index] = order,
        Ok((_, None)) => {}
        Err(e) => error!("Feed resolution task failed: {e}"),
    }
}

/// The inventory skeleton for a Subscription: same name and namespace,
/// labelled with its origin and owned by the Subscription.
fn inventory_for(subscription: &Subscription) -> FeedInventory {
    let name = subscription.name_any();
    let namespace = subscription.namespace().unwrap_or_default();

    let mut inventory = FeedInventory::new(&name, FeedInventorySpec::default());
    inventory.metadata.namespace = Some(namespace.clone());
    inventory.metadata.labels = Some(BTreeMap::from([
        (
            labels::OBJECT_CREATED_BY.to_string(),
            labels::CREATED_BY_HUB.to_string(),
        ),
        (labels::SUBSCRIPTION_NAME.to_string(), name),
        (labels::SUBSCRIPTION_NAMESPACE.to_string(), namespace),
        (
            labels::SUBSCRIPTION_UID.to_string(),
            subscription.metadata.uid.clone().unwrap_or_default(),
        ),
    ]));
    inventory.metadata.owner_references = subscription.controller_owner_ref(&()).map(|r| vec![r]);
    inventory
}

/// Label selector for the Manifests backing a feed.
pub fn manifest_selector(feed: &Feed) -> Result<Selector, Report<ResolveError>> {
    let gvk = GroupVersionKind::from_api_version(&feed.api_version, &feed.kind);
    let selector = Selector::everything()
        .with_equals(labels::CONFIG_GROUP, gvk.group)
        .with_equals(labels::CONFIG_VERSION, gvk.version)
        .with_equals(labels::CONFIG_KIND, gvk.kind);

    match &feed.feed_selector {
        Some(label_selector) => {
            let extra = Selector::from_label_selector(label_selector).change_context(
                ResolveError::InvalidSelector {
                    feed: feed.display_ref(),
                },
            )?;
            Ok(selector.and(extra))
        }
        None => Ok(selector
            .with_equals(
                labels::CONFIG_NAME,
                feed.name.as_deref().unwrap_or_default(),
            )
            .with_equals(
                labels::CONFIG_NAMESPACE,
                feed.namespace.as_deref().unwrap_or_default(),
            )),
    }
}

#[derive(Clone)]
struct FeedResolver {
    lister: Arc<dyn ObjectLister>,
    registry: Arc<Registry>,
    reserved_namespace: Arc<str>,
}

impl FeedResolver {
    fn resolve(&self, feed: Feed) -> Option<FeedOrder> {
        match self.parse_feed(&feed) {
            Ok(parsed) => Some(FeedOrder {
                feed,
                desired_replicas: parsed.desired_replicas,
                replica_requirements: parsed.requirements,
                replica_json_path: parsed.replica_json_path,
            }),
            Err(report) => {
                warn!(feed = %feed.display_ref(), kind = %feed.kind, "Keeping selector-only feed: {report:?}");
                None
            }
        }
    }

    fn parse_feed(&self, feed: &Feed) -> Result<ParsedWorkload, Report<ResolveError>> {
        let selector = manifest_selector(feed)?;

        let mut manifests = self.lister.list_manifests(&self.reserved_namespace, &selector);
        manifests.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        let manifest = manifests.first().ok_or_else(|| {
            Report::new(ResolveError::ManifestNotFound {
                feed: feed.display_ref(),
            })
            .attach_printable(format!("selector: {selector}"))
        })?;
        let manifest_name = manifest.name_any();

        let raw = manifest
            .raw_template()
            .change_context(ResolveError::InvalidTemplate {
                manifest: manifest_name.clone(),
            })?;
        let gvk = GroupVersionKind::from_template(&raw).change_context(
            ResolveError::InvalidTemplate {
                manifest: manifest_name.clone(),
            },
        )?;

        let plugin = self.registry.lookup(&gvk).ok_or_else(|| {
            Report::new(ResolveError::NoPlugin {
                gvk: gvk.to_string(),
            })
        })?;

        plugin.parse(&raw).change_context(ResolveError::Parse {
            plugin: plugin.name().to_string(),
            manifest: manifest_name,
        })
    }
}
