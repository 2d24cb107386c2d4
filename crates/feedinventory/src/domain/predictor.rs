//! Replica capacity estimation over the cached node list.
//!
//! For every node matching the requirement's node selector the predictor
//! computes how many replicas fit by resources, after filtering out nodes
//! whose taints are not tolerated or which are flagged as exhausted. The
//! answer is the smaller of the summed per-node fits and the summed per-node
//! capacity annotations.

use core::error::Error;
use std::collections::BTreeMap;
use std::sync::Arc;

use api_types::ReplicaRequirements;
use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Taint;
use k8s_openapi::api::core::v1::Toleration;
use kube::ResourceExt;
use tracing::debug;
use tracing::warn;

use super::quantity::ParsedQuantity;
use super::quantity::QuantityError;
use super::selector::Selector;
use super::traits::NodeLister;

pub const DEFAULT_EXHAUSTED_ANNOTATION: &str = "tke.cloud.tencent.com/res-cloud-hssd";
pub const DEFAULT_EXHAUSTED_VALUE: &str = "false";
pub const DEFAULT_CAPACITY_ANNOTATION: &str = "tke.cloud.tencent.com/available-ip-count";
pub const DEFAULT_MAX_REPLICAS_PER_NODE: u64 = 1000;

#[derive(Debug, derive_more::Display)]
pub enum PredictorError {
    #[display("Node cache has not synced yet")]
    CacheNotSynced,
}

impl Error for PredictorError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimateOptions {
    /// Node annotation that marks a node as unusable
    pub exhausted_annotation: String,
    /// Value of `exhausted_annotation` meaning "unusable"
    pub exhausted_value: String,
    /// Node annotation (or label) bounding replicas per node
    pub capacity_annotation: String,
    /// Starting per-node fit before resources are considered
    pub max_replicas_per_node: u64,
}

impl Default for EstimateOptions {
    fn default() -> Self {
        Self {
            exhausted_annotation: DEFAULT_EXHAUSTED_ANNOTATION.to_string(),
            exhausted_value: DEFAULT_EXHAUSTED_VALUE.to_string(),
            capacity_annotation: DEFAULT_CAPACITY_ANNOTATION.to_string(),
            max_replicas_per_node: DEFAULT_MAX_REPLICAS_PER_NODE,
        }
    }
}

pub struct CapacityPredictor {
    nodes: Arc<dyn NodeLister>,
    options: EstimateOptions,
}

impl CapacityPredictor {
    pub fn new(nodes: Arc<dyn NodeLister>, options: EstimateOptions) -> Self {
        Self { nodes, options }
    }

    pub fn is_ready(&self) -> bool {
        self.nodes.has_synced()
    }

    /// Maximum number of replicas the cluster can currently accept.
    #[tracing::instrument(skip_all)]
    pub fn estimate(&self, requirements: &ReplicaRequirements) -> u64 {
        let requests = match parse_requests(requirements) {
            Ok(requests) => requests,
            Err(report) => {
                warn!("Ignoring requirements with invalid requests: {report:?}");
                return self.estimate(&ReplicaRequirements::default());
            }
        };

        let selector = Selector::from_labels(requirements.node_selector.iter());
        let nodes = self.nodes.list_nodes(&selector).unwrap_or_else(|report| {
            warn!("Estimating without nodes: {report:?}");
            Vec::new()
        });

        let mut by_resources: u64 = 0;
        let mut by_annotation: u64 = 0;
        for node in &nodes {
            let fit = node_fit(node, &requests, &requirements.tolerations, &self.options);
            if fit == 0 {
                continue;
            }
            by_resources = by_resources.saturating_add(fit);
            by_annotation =
                by_annotation.saturating_add(node_capacity_limit(node, fit, &self.options));
        }

        debug!(
            nodes = nodes.len(),
            by_resources, by_annotation, "Estimated acceptable replicas"
        );
        by_resources.min(by_annotation)
    }
}

/// Requested quantities in whole units; zero requests place no bound.
fn parse_requests(
    requirements: &ReplicaRequirements,
) -> Result<BTreeMap<String, i128>, Report<QuantityError>> {
    let mut requests = BTreeMap::new();
    for (name, quantity) in requirements.requests() {
        let units = ParsedQuantity::parse(quantity)
            .attach_printable_lazy(|| format!("resource: {name}"))?
            .ceil_units();
        if units > 0 {
            requests.insert(name.clone(), units);
        }
    }
    Ok(requests)
}

/// How many replicas fit on one node; zero when the node is unusable.
pub fn node_fit(
    node: &Node,
    requests: &BTreeMap<String, i128>,
    tolerations: &[Toleration],
    options: &EstimateOptions,
) -> u64 {
    let name = node.name_any();

    let taints: &[Taint] = node
        .spec
        .as_ref()
        .and_then(|spec| spec.taints.as_deref())
        .unwrap_or_default();
    if !taints.is_empty()
        && !taints
            .iter()
            .any(|taint| tolerations.iter().any(|t| tolerates(t, taint)))
    {
        debug!(node = %name, "No taint tolerated");
        return 0;
    }

    if node.annotations().get(&options.exhausted_annotation) == Some(&options.exhausted_value) {
        debug!(node = %name, "Node is flagged as exhausted");
        return 0;
    }

    let capacity = node.status.as_ref().and_then(|s| s.capacity.as_ref());
    let mut fit = options.max_replicas_per_node;
    for (resource, request) in requests {
        let available = match capacity.and_then(|c| c.get(resource)) {
            Some(quantity) => match ParsedQuantity::parse(quantity) {
                Ok(parsed) => parsed.ceil_units(),
                Err(report) => {
                    warn!(node = %name, resource = %resource, "Invalid node capacity: {report:?}");
                    0
                }
            },
            None => 0,
        };
        let replicas = u64::try_from(available.max(0) / request).unwrap_or(u64::MAX);
        if replicas == 0 {
            debug!(node = %name, resource = %resource, "Insufficient capacity");
            return 0;
        }
        fit = fit.min(replicas);
    }
    fit
}

/// The annotation-derived bound of a usable node. Annotations take precedence
/// over labels; a node without either is bounded only by its fit and an
/// unparsable value counts as zero.
fn node_capacity_limit(node: &Node, fit: u64, options: &EstimateOptions) -> u64 {
    let raw = node
        .annotations()
        .get(&options.capacity_annotation)
        .or_else(|| node.labels().get(&options.capacity_annotation));

    match raw {
        None => fit,
        Some(value) => value.trim().parse::<u64>().unwrap_or_else(|e| {
            warn!(
                node = %node.name_any(),
                value = %value,
                "Invalid {} value: {e}",
                options.capacity_annotation
            );
            0
        }),
    }
}

/// Whether `toleration` tolerates `taint`. Empty toleration effect or key act
/// as wildcards; an unknown operator never matches.
pub fn tolerates(toleration: &Toleration, taint: &Taint) -> bool {
    if let Some(effect) = toleration.effect.as_deref().filter(|e| !e.is_empty()) {
        if effect != taint.effect {
            return false;
        }
    }
    if let Some(key) = toleration.key.as_deref().filter(|k| !k.is_empty()) {
        if key != taint.key {
            return false;
        }
    }
    match toleration.operator.as_deref().unwrap_or_default() {
        "" | "Equal" => {
            toleration.value.as_deref().unwrap_or_default()
                == taint.value.as_deref().unwrap_or_default()
        }
        "Exists" => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::NodeSpec;
    use k8s_openapi::api::core::v1::NodeStatus;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use similar_asserts::assert_eq;

    use super::*;
    use crate::domain::mock::StaticNodes;

    fn node(name: &str, cpu: &str, memory: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(NodeSpec::default()),
            status: Some(NodeStatus {
                capacity: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity(cpu.to_string())),
                    ("memory".to_string(), Quantity(memory.to_string())),
                ])),
                ..Default::default()
            }),
        }
    }

    fn with_annotation(mut node: Node, key: &str, value: &str) -> Node {
        node.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        node
    }

    fn with_label(mut node: Node, key: &str, value: &str) -> Node {
        node.metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        node
    }

    fn with_taint(mut node: Node, key: &str, value: Option<&str>, effect: &str) -> Node {
        node.spec
            .get_or_insert_with(NodeSpec::default)
            .taints
            .get_or_insert_with(Vec::new)
            .push(Taint {
                key: key.to_string(),
                value: value.map(str::to_string),
                effect: effect.to_string(),
                time_added: None,
            });
        node
    }

    fn requirements(json: serde_json::Value) -> ReplicaRequirements {
        serde_json::from_value(json).expect("should parse requirements")
    }

    fn predictor(nodes: Vec<Node>) -> CapacityPredictor {
        CapacityPredictor::new(Arc::new(StaticNodes::new(nodes)), EstimateOptions::default())
    }

    fn toleration(key: Option<&str>, operator: Option<&str>, value: Option<&str>, effect: Option<&str>) -> Toleration {
        Toleration {
            key: key.map(str::to_string),
            operator: operator.map(str::to_string),
            value: value.map(str::to_string),
            effect: effect.map(str::to_string),
            toleration_seconds: None,
        }
    }

    fn taint(key: &str, value: Option<&str>, effect: &str) -> Taint {
        Taint {
            key: key.to_string(),
            value: value.map(str::to_string),
            effect: effect.to_string(),
            time_added: None,
        }
    }

    #[test]
    fn toleration_matching() {
        let gpu = taint("gpu", Some("a100"), "NoSchedule");

        assert!(tolerates(&toleration(Some("gpu"), Some("Equal"), Some("a100"), None), &gpu));
        assert!(tolerates(&toleration(Some("gpu"), None, Some("a100"), Some("NoSchedule")), &gpu));
        assert!(tolerates(&toleration(Some("gpu"), Some("Exists"), None, None), &gpu));
        assert!(tolerates(&toleration(None, Some("Exists"), None, None), &gpu));
        assert!(!tolerates(&toleration(Some("gpu"), Some("Equal"), Some("t4"), None), &gpu));
        assert!(!tolerates(&toleration(Some("gpu"), Some("Exists"), None, Some("NoExecute")), &gpu));
        assert!(!tolerates(&toleration(Some("disk"), Some("Exists"), None, None), &gpu));
        assert!(!tolerates(&toleration(Some("gpu"), Some("Gt"), Some("a100"), None), &gpu));
    }

    #[test]
    fn fit_is_bounded_by_the_scarcest_resource() {
        let n = node("n1", "4", "8Gi");
        let requests = BTreeMap::from([
            ("cpu".to_string(), 1),
            ("memory".to_string(), 3 * 1024 * 1024 * 1024),
        ]);

        assert_eq!(node_fit(&n, &requests, &[], &EstimateOptions::default()), 2);
    }

    #[test]
    fn fit_without_requests_is_the_per_node_maximum() {
        let n = node("n1", "4", "8Gi");

        assert_eq!(
            node_fit(&n, &BTreeMap::new(), &[], &EstimateOptions::default()),
            DEFAULT_MAX_REPLICAS_PER_NODE
        );
    }

    #[test]
    fn missing_capacity_means_no_fit() {
        let n = node("n1", "4", "8Gi");
        let requests = BTreeMap::from([("nvidia.com/gpu".to_string(), 1)]);

        assert_eq!(node_fit(&n, &requests, &[], &EstimateOptions::default()), 0);
    }

    #[test]
    fn untolerated_taint_excludes_node() {
        let tainted = with_taint(node("n1", "4", "8Gi"), "dedicated", Some("infra"), "NoSchedule");
        let options = EstimateOptions::default();

        assert_eq!(node_fit(&tainted, &BTreeMap::new(), &[], &options), 0);
        assert_eq!(
            node_fit(
                &tainted,
                &BTreeMap::new(),
                &[toleration(Some("dedicated"), Some("Equal"), Some("infra"), None)],
                &options
            ),
            DEFAULT_MAX_REPLICAS_PER_NODE
        );
    }

    #[test]
    fn one_tolerated_taint_is_enough() {
        let tainted = with_taint(
            with_taint(node("n1", "4", "8Gi"), "a", None, "NoSchedule"),
            "b",
            None,
            "NoSchedule",
        );

        assert_eq!(
            node_fit(
                &tainted,
                &BTreeMap::new(),
                &[toleration(Some("a"), Some("Exists"), None, None)],
                &EstimateOptions::default()
            ),
            DEFAULT_MAX_REPLICAS_PER_NODE
        );
    }

    #[test]
    fn exhausted_node_is_excluded() {
        let n = with_annotation(node("n1", "4", "8Gi"), DEFAULT_EXHAUSTED_ANNOTATION, "false");

        assert_eq!(
            node_fit(&n, &BTreeMap::new(), &[], &EstimateOptions::default()),
            0
        );
    }

    #[test]
    fn estimate_is_min_of_fit_and_capacity_annotation() {
        let predictor = predictor(vec![
            with_annotation(node("n1", "4", "8Gi"), DEFAULT_CAPACITY_ANNOTATION, "3"),
            with_annotation(node("n2", "2", "8Gi"), DEFAULT_CAPACITY_ANNOTATION, "10"),
        ]);
        let req = requirements(serde_json::json!({"resources": {"requests": {"cpu": "1"}}}));

        // Fits: 4 + 2 = 6. Annotations: 3 + 10 = 13.
        assert_eq!(predictor.estimate(&req), 6);

        let req = requirements(serde_json::json!({"resources": {"requests": {"cpu": "500m"}}}));
        // Sub-unit requests round up to one unit: fits 4 + 2 = 6.
        assert_eq!(predictor.estimate(&req), 6);
    }

    #[test]
    fn milli_cpu_nodes_are_capped_by_annotations() {
        let req = requirements(serde_json::json!({"resources": {"requests": {"cpu": "1000m"}}}));

        let unannotated = predictor(vec![node("n1", "4000m", "8Gi"), node("n2", "4000m", "8Gi")]);
        assert_eq!(unannotated.estimate(&req), 8);

        let annotated = predictor(vec![
            with_annotation(node("n1", "4000m", "8Gi"), DEFAULT_CAPACITY_ANNOTATION, "2"),
            with_annotation(node("n2", "4000m", "8Gi"), DEFAULT_CAPACITY_ANNOTATION, "3"),
        ]);
        assert_eq!(annotated.estimate(&req), 5);
    }

    #[test]
    fn capacity_annotation_can_bind() {
        let predictor = predictor(vec![
            with_annotation(node("n1", "64", "256Gi"), DEFAULT_CAPACITY_ANNOTATION, "2"),
            with_label(node("n2", "64", "256Gi"), DEFAULT_CAPACITY_ANNOTATION, "1"),
            with_annotation(node("n3", "64", "256Gi"), DEFAULT_CAPACITY_ANNOTATION, "many"),
        ]);
        let req = requirements(serde_json::json!({"resources": {"requests": {"cpu": "1"}}}));

        assert_eq!(predictor.estimate(&req), 3);
    }

    #[test]
    fn node_selector_filters_nodes() {
        let predictor = predictor(vec![
            with_label(node("n1", "4", "8Gi"), "zone", "a"),
            with_label(node("n2", "8", "8Gi"), "zone", "b"),
        ]);
        let req = requirements(serde_json::json!({
            "nodeSelector": {"zone": "b"},
            "resources": {"requests": {"cpu": "2"}}
        }));

        assert_eq!(predictor.estimate(&req), 4);
    }

    #[test]
    fn empty_cluster_accepts_nothing() {
        let predictor = predictor(Vec::new());

        assert_eq!(
            predictor.estimate(&ReplicaRequirements::default()),
            0
        );
    }

    #[test]
    fn invalid_request_falls_back_to_default_requirements() {
        let predictor = predictor(vec![node("n1", "4", "8Gi")]);
        let req = requirements(serde_json::json!({"resources": {"requests": {"cpu": "lots"}}}));

        assert_eq!(
            predictor.estimate(&req),
            DEFAULT_MAX_REPLICAS_PER_NODE
        );
    }

    #[test]
    fn unsynced_cache_estimates_zero() {
        let predictor = CapacityPredictor::new(
            Arc::new(StaticNodes::unsynced()),
            EstimateOptions::default(),
        );

        assert!(!predictor.is_ready());
        assert_eq!(predictor.estimate(&ReplicaRequirements::default()), 0);
    }
}
