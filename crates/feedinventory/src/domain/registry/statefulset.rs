use error_stack::Report;

use super::workload::parse_pod_template_workload;
use super::ParsedWorkload;
use super::Plugin;
use super::PluginError;

/// Parses StatefulSets, which share the Deployment replica and template layout.
#[derive(Debug, Default)]
pub struct StatefulSetPlugin;

impl StatefulSetPlugin {
    pub const KIND: &'static str = "StatefulSet";

    pub const GROUP_VERSIONS: &'static [(&'static str, &'static str)] =
        &[("apps", "v1"), ("apps", "v1beta1"), ("apps", "v1beta2")];

    pub fn new() -> Self {
        Self
    }
}

impl Plugin for StatefulSetPlugin {
    fn parse(&self, raw: &[u8]) -> Result<ParsedWorkload, Report<PluginError>> {
        parse_pod_template_workload(raw, Self::KIND)
    }

    fn name(&self) -> &str {
        "statefulset"
    }

    fn kind(&self) -> &str {
        Self::KIND
    }
}
