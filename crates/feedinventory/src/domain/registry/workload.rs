//! Shared parsing for workloads that embed a pod template.

use std::collections::BTreeMap;

use api_types::ReplicaRequirements;
use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::Deserialize;

use super::ParsedWorkload;
use super::PluginError;
use crate::domain::quantity::ParsedQuantity;

/// JSON pointer of the replica field of `spec.replicas` workloads.
pub const REPLICAS_JSON_PATH: &str = "/spec/replicas";

#[derive(Deserialize)]
struct PodTemplateWorkload {
    #[serde(default)]
    spec: WorkloadSpec,
}

#[derive(Default, Deserialize)]
struct WorkloadSpec {
    #[serde(default)]
    replicas: Option<i32>,
    #[serde(default)]
    template: Option<PodTemplateSpec>,
}

/// Parses any workload shaped like `{spec: {replicas, template: PodTemplateSpec}}`.
pub(crate) fn parse_pod_template_workload(
    raw: &[u8],
    kind: &str,
) -> Result<ParsedWorkload, Report<PluginError>> {
    let workload: PodTemplateWorkload =
        serde_json::from_slice(raw).change_context(PluginError::Decode {
            kind: kind.to_string(),
        })?;

    let requirements = match workload.spec.template.and_then(|t| t.spec) {
        Some(pod_spec) => replica_requirements(&pod_spec)?,
        None => ReplicaRequirements::default(),
    };

    Ok(ParsedWorkload {
        desired_replicas: workload.spec.replicas,
        requirements,
        replica_json_path: REPLICAS_JSON_PATH.to_string(),
    })
}

/// Placement requirements of a single pod built from `pod_spec`.
pub fn replica_requirements(
    pod_spec: &PodSpec,
) -> Result<ReplicaRequirements, Report<PluginError>> {
    Ok(ReplicaRequirements {
        node_selector: pod_spec.node_selector.clone().unwrap_or_default(),
        tolerations: pod_spec.tolerations.clone().unwrap_or_default(),
        resources: ResourceRequirements {
            requests: pod_resource_list(pod_spec, |r| r.requests.as_ref())?,
            limits: pod_resource_list(pod_spec, |r| r.limits.as_ref())?,
            claims: None,
        },
    })
}

type ResourceList = BTreeMap<String, Quantity>;

/// Effective pod resources: the sum over containers, raised to the largest
/// init container, plus pod overhead.
fn pod_resource_list<F>(
    pod_spec: &PodSpec,
    select: F,
) -> Result<Option<ResourceList>, Report<PluginError>>
where
    F: Fn(&ResourceRequirements) -> Option<&ResourceList>,
{
    let mut totals: BTreeMap<String, ResourceSum> = BTreeMap::new();

    for container in &pod_spec.containers {
        for (name, quantity) in container.resources.as_ref().and_then(&select).into_iter().flatten() {
            totals.entry(name.clone()).or_default().add(name, quantity)?;
        }
    }

    for container in pod_spec.init_containers.iter().flatten() {
        for (name, quantity) in container.resources.as_ref().and_then(&select).into_iter().flatten() {
            totals.entry(name.clone()).or_default().raise_to(name, quantity)?;
        }
    }

    for (name, quantity) in pod_spec.overhead.iter().flatten() {
        totals.entry(name.clone()).or_default().add(name, quantity)?;
    }

    if totals.is_empty() {
        return Ok(None);
    }
    Ok(Some(
        totals
            .into_iter()
            .map(|(name, sum)| (name, sum.into_quantity()))
            .collect(),
    ))
}

/// Running total of one resource. A total fed by a single quantity keeps that
/// quantity's original spelling.
#[derive(Default)]
struct ResourceSum {
    total: ParsedQuantity,
    verbatim: Option<Quantity>,
    contributors: usize,
}

impl ResourceSum {
    fn add(&mut self, name: &str, quantity: &Quantity) -> Result<(), Report<PluginError>> {
        let parsed = parse(name, quantity)?;
        self.total = self.total + parsed;
        self.contributors += 1;
        self.verbatim = (self.contributors == 1).then(|| quantity.clone());
        Ok(())
    }

    fn raise_to(&mut self, name: &str, quantity: &Quantity) -> Result<(), Report<PluginError>> {
        let parsed = parse(name, quantity)?;
        if parsed > self.total {
            self.total = parsed;
            self.verbatim = Some(quantity.clone());
            self.contributors = 1;
        }
        Ok(())
    }

    fn into_quantity(self) -> Quantity {
        self.verbatim.unwrap_or_else(|| self.total.to_quantity())
    }
}

fn parse(name: &str, quantity: &Quantity) -> Result<ParsedQuantity, Report<PluginError>> {
    ParsedQuantity::parse(quantity).change_context(PluginError::InvalidQuantity {
        resource: name.to_string(),
    })
}
