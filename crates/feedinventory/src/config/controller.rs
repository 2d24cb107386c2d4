use clap::Parser;

use crate::config::connection::KubeArgs;
use crate::domain::reconciler::ReconcilerConfig;

#[derive(Parser, Debug, Clone)]
pub struct ControllerArgs {
    #[command(flatten)]
    pub kube: KubeArgs,

    #[arg(
        long,
        env = "FEEDINVENTORY_WORKERS",
        default_value = "2",
        help = "Number of Subscriptions reconciled concurrently"
    )]
    pub workers: usize,

    #[arg(
        long,
        env = "FEEDINVENTORY_FEED_CONCURRENCY",
        default_value = "8",
        help = "Upper bound on feeds resolved at once within one Subscription"
    )]
    pub feed_concurrency: usize,

    #[arg(
        long,
        env = "FEEDINVENTORY_RESERVED_NAMESPACE",
        default_value = api_types::RESERVED_NAMESPACE,
        help = "Namespace holding the Manifests"
    )]
    pub reserved_namespace: String,
}

impl From<&ControllerArgs> for ReconcilerConfig {
    fn from(args: &ControllerArgs) -> Self {
        Self {
            reserved_namespace: args.reserved_namespace.clone(),
            feed_concurrency: args.feed_concurrency.max(1),
        }
    }
}
