use std::borrow::Cow;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::runtime::RawExtension;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::Deserialize;
use serde::Serialize;

/// A stored workload template.
///
/// Unlike most resources a Manifest has no `spec`: the raw object lives in the
/// top-level `template` field, so the [`Resource`] impl is written by hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub template: RawExtension,
}

impl Manifest {
    /// Serialized bytes of the embedded workload object.
    pub fn raw_template(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.template.0)
    }
}

impl Resource for Manifest {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn kind(_: &()) -> Cow<'_, str> {
        "Manifest".into()
    }

    fn group(_: &()) -> Cow<'_, str> {
        crate::GROUP.into()
    }

    fn version(_: &()) -> Cow<'_, str> {
        crate::VERSION.into()
    }

    fn plural(_: &()) -> Cow<'_, str> {
        "manifests".into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_exposes_template_bytes() {
        let json = r#"{
            "apiVersion": "apps.clusternet.io/v1alpha1",
            "kind": "Manifest",
            "metadata": {"name": "web", "namespace": "clusternet-reserved"},
            "template": {"apiVersion": "apps/v1", "kind": "Deployment", "spec": {"replicas": 2}}
        }"#;

        let manifest: Manifest = serde_json::from_str(json).expect("should parse manifest");
        let raw = manifest.raw_template().expect("should serialize template");
        let value: serde_json::Value = serde_json::from_slice(&raw).expect("should be json");

        assert_eq!(value["kind"], "Deployment");
        assert_eq!(value["spec"]["replicas"], 2);
    }

    #[test]
    fn manifest_resource_metadata() {
        assert_eq!(Manifest::api_version(&()), "apps.clusternet.io/v1alpha1");
        assert_eq!(Manifest::plural(&()), "manifests");
    }
}
