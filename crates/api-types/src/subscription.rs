use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::ReplicaRequirements;

/// How a Subscription spreads its feeds across subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SchedulingStrategy {
    /// Every subscriber gets the full set of replicas.
    #[default]
    Replication,
    /// Replicas are divided between subscribers; the only strategy that needs an inventory.
    Dividing,
    #[serde(other)]
    Unknown,
}

/// A reference to one workload template to be inventoried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub kind: String,
    pub api_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Selects several objects of the same kind by label instead of by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_selector: Option<LabelSelector>,
}

impl Feed {
    /// Human readable `namespace/name` of the referenced object.
    pub fn display_ref(&self) -> String {
        format!(
            "{}/{}",
            self.namespace.as_deref().unwrap_or_default(),
            self.name.as_deref().unwrap_or_default()
        )
    }
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apps.clusternet.io",
    version = "v1alpha1",
    kind = "Subscription",
    plural = "subscriptions",
    shortname = "subs",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    #[serde(default)]
    pub scheduling_strategy: SchedulingStrategy,
    #[serde(default)]
    pub feeds: Vec<Feed>,
}

/// Resolved replica and resource metadata for one feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FeedOrder {
    #[serde(flatten)]
    pub feed: Feed,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_replicas: Option<i32>,
    #[serde(default)]
    pub replica_requirements: ReplicaRequirements,
    #[serde(default)]
    pub replica_json_path: String,
}

impl FeedOrder {
    /// An order that only carries the feed selector, used when resolution fails.
    pub fn selector_only(feed: Feed) -> Self {
        Self {
            feed,
            ..Default::default()
        }
    }
}

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apps.clusternet.io",
    version = "v1alpha1",
    kind = "FeedInventory",
    plural = "feedinventories",
    shortname = "finv",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct FeedInventorySpec {
    #[serde(default)]
    pub feeds: Vec<FeedOrder>,
}
