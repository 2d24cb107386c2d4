use std::path::PathBuf;

use clap::Args;

/// API server connection flags shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct KubeArgs {
    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to in-cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "KUBE_MASTER_URL",
        value_hint = clap::ValueHint::Url,
        help = "Kubernetes API server URL, overrides the one in kubeconfig"
    )]
    pub master: Option<String>,
}
