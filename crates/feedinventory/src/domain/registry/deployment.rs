use error_stack::Report;

use super::workload::parse_pod_template_workload;
use super::ParsedWorkload;
use super::Plugin;
use super::PluginError;

/// Parses Deployments across every API group that has served them.
#[derive(Debug, Default)]
pub struct DeploymentPlugin;

impl DeploymentPlugin {
    pub const KIND: &'static str = "Deployment";

    pub const GROUP_VERSIONS: &'static [(&'static str, &'static str)] = &[
        ("apps", "v1"),
        ("apps", "v1beta1"),
        ("apps", "v1beta2"),
        ("extensions", "v1beta1"),
    ];

    pub fn new() -> Self {
        Self
    }
}

impl Plugin for DeploymentPlugin {
    fn parse(&self, raw: &[u8]) -> Result<ParsedWorkload, Report<PluginError>> {
        parse_pod_template_workload(raw, Self::KIND)
    }

    fn name(&self) -> &str {
        "deployment"
    }

    fn kind(&self) -> &str {
        Self::KIND
    }
}
