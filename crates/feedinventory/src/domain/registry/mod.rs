//! Workload parser plugins keyed by group/version/kind.
//!
//! Each plugin turns the raw bytes of a workload template into its desired
//! replica count, per-replica requirements and the JSON pointer of the replica
//! field. The registry is populated once at startup and shared read-only.

mod deployment;
mod statefulset;
pub mod workload;

use core::error::Error;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use api_types::ReplicaRequirements;
pub use deployment::DeploymentPlugin;
use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;
pub use statefulset::StatefulSetPlugin;

#[derive(Debug, derive_more::Display)]
pub enum PluginError {
    #[display("Failed to decode {kind} template")]
    Decode { kind: String },
    #[display("Template has no {field}")]
    MissingField { field: String },
    #[display("Invalid {resource} quantity in pod template")]
    InvalidQuantity { resource: String },
}

impl Error for PluginError {}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Splits `group/version`; a bare version belongs to the core group.
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    /// Reads `apiVersion` and `kind` from a serialized object.
    pub fn from_template(raw: &[u8]) -> Result<Self, Report<PluginError>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct TypeMeta {
            #[serde(default)]
            api_version: String,
            #[serde(default)]
            kind: String,
        }

        let meta: TypeMeta =
            serde_json::from_slice(raw).change_context(PluginError::Decode {
                kind: "object".to_string(),
            })?;
        if meta.kind.is_empty() {
            return Err(Report::new(PluginError::MissingField {
                field: "kind".to_string(),
            }));
        }
        if meta.api_version.is_empty() {
            return Err(Report::new(PluginError::MissingField {
                field: "apiVersion".to_string(),
            }));
        }
        Ok(Self::from_api_version(&meta.api_version, &meta.kind))
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}, Kind={}", self.version, self.kind)
        } else {
            write!(f, "{}/{}, Kind={}", self.group, self.version, self.kind)
        }
    }
}

/// What a plugin extracts from a workload template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedWorkload {
    pub desired_replicas: Option<i32>,
    pub requirements: ReplicaRequirements,
    pub replica_json_path: String,
}

pub trait Plugin: Send + Sync {
    fn parse(&self, raw: &[u8]) -> Result<ParsedWorkload, Report<PluginError>>;

    fn name(&self) -> &str;

    fn kind(&self) -> &str;
}

#[derive(Clone, Default)]
pub struct Registry {
    plugins: HashMap<GroupVersionKind, Arc<dyn Plugin>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in Deployment and StatefulSet plugins.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_versions(
            DeploymentPlugin::GROUP_VERSIONS,
            Arc::new(DeploymentPlugin::new()),
        );
        registry.register_versions(
            StatefulSetPlugin::GROUP_VERSIONS,
            Arc::new(StatefulSetPlugin::new()),
        );
        registry
    }

    /// Registers a plugin, returning the one it replaced.
    pub fn register(
        &mut self,
        gvk: GroupVersionKind,
        plugin: Arc<dyn Plugin>,
    ) -> Option<Arc<dyn Plugin>> {
        self.plugins.insert(gvk, plugin)
    }

    /// Registers one plugin under its kind for every `(group, version)` pair.
    pub fn register_versions(&mut self, group_versions: &[(&str, &str)], plugin: Arc<dyn Plugin>) {
        for (group, version) in group_versions {
            let gvk = GroupVersionKind::new(group, version, plugin.kind());
            self.register(gvk, plugin.clone());
        }
    }

    pub fn lookup(&self, gvk: &GroupVersionKind) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(gvk).cloned()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<String> = self.plugins.keys().map(ToString::to_string).collect();
        kinds.sort();
        f.debug_struct("Registry").field("plugins", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn api_version_splitting() {
        assert_eq!(
            GroupVersionKind::from_api_version("apps/v1", "Deployment"),
            GroupVersionKind::new("apps", "v1", "Deployment")
        );
        assert_eq!(
            GroupVersionKind::from_api_version("v1", "Pod"),
            GroupVersionKind::new("", "v1", "Pod")
        );
    }

    #[test]
    fn gvk_from_template() {
        let raw = br#"{"apiVersion": "extensions/v1beta1", "kind": "Deployment", "spec": {}}"#;

        let gvk = GroupVersionKind::from_template(raw).expect("should read type meta");

        assert_eq!(gvk, GroupVersionKind::new("extensions", "v1beta1", "Deployment"));
        assert_eq!(gvk.to_string(), "extensions/v1beta1, Kind=Deployment");
    }

    #[test]
    fn gvk_from_template_requires_kind() {
        let err = GroupVersionKind::from_template(br#"{"apiVersion": "apps/v1"}"#)
            .expect_err("kind is required");
        assert!(matches!(
            err.current_context(),
            PluginError::MissingField { .. }
        ));
        assert!(GroupVersionKind::from_template(b"not json").is_err());
    }

    #[test]
    fn defaults_cover_all_deployment_versions() {
        let registry = Registry::with_defaults();

        for (group, version) in DeploymentPlugin::GROUP_VERSIONS {
            let plugin = registry
                .lookup(&GroupVersionKind::new(group, version, "Deployment"))
                .expect("deployment plugin should be registered");
            assert_eq!(plugin.kind(), "Deployment");
        }
        assert!(registry
            .lookup(&GroupVersionKind::new("apps", "v1", "StatefulSet"))
            .is_some());
        assert!(registry
            .lookup(&GroupVersionKind::new("apps", "v1", "DaemonSet"))
            .is_none());
        assert_eq!(
            registry.len(),
            DeploymentPlugin::GROUP_VERSIONS.len() + StatefulSetPlugin::GROUP_VERSIONS.len()
        );
    }

    #[test]
    fn register_replaces_existing_plugin() {
        let mut registry = Registry::new();
        let gvk = GroupVersionKind::new("apps", "v1", "Deployment");

        assert!(registry
            .register(gvk.clone(), Arc::new(DeploymentPlugin::new()))
            .is_none());
        assert!(registry
            .register(gvk, Arc::new(DeploymentPlugin::new()))
            .is_some());
        assert_eq!(registry.len(), 1);
    }
}
