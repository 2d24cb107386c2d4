use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::api::core::v1::Toleration;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Everything needed to place a single replica of a workload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaRequirements {
    /// Equality-matched node labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    /// Resource requests (and limits) of one replica
    #[serde(default)]
    pub resources: ResourceRequirements,
}

impl ReplicaRequirements {
    /// Resource requests, empty when none are declared.
    pub fn requests(&self) -> impl Iterator<Item = (&String, &Quantity)> {
        self.resources.requests.iter().flatten()
    }
}
