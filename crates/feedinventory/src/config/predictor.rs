use clap::Parser;

use crate::config::connection::KubeArgs;
use crate::domain::predictor::EstimateOptions;
use crate::domain::predictor::DEFAULT_CAPACITY_ANNOTATION;
use crate::domain::predictor::DEFAULT_EXHAUSTED_ANNOTATION;
use crate::domain::predictor::DEFAULT_EXHAUSTED_VALUE;

#[derive(Parser, Debug, Clone)]
pub struct PredictorArgs {
    #[command(flatten)]
    pub kube: KubeArgs,

    #[arg(
        long,
        env = "PREDICTOR_PORT",
        default_value = "80",
        help = "HTTP port of the predictor server"
    )]
    pub port: u16,

    #[arg(
        long,
        env = "PREDICTOR_LISTEN_HOST",
        default_value = "0.0.0.0",
        help = "Address the predictor server binds to"
    )]
    pub listen_host: String,

    #[arg(
        long,
        env = "PREDICTOR_EXHAUSTED_ANNOTATION",
        default_value = DEFAULT_EXHAUSTED_ANNOTATION,
        help = "Node annotation marking a node as out of resources"
    )]
    pub exhausted_annotation: String,

    #[arg(
        long,
        env = "PREDICTOR_EXHAUSTED_VALUE",
        default_value = DEFAULT_EXHAUSTED_VALUE,
        help = "Value of the exhausted annotation that excludes a node"
    )]
    pub exhausted_value: String,

    #[arg(
        long,
        env = "PREDICTOR_CAPACITY_ANNOTATION",
        default_value = DEFAULT_CAPACITY_ANNOTATION,
        help = "Node annotation or label bounding the replicas a node accepts"
    )]
    pub capacity_annotation: String,

    #[arg(
        long,
        env = "PREDICTOR_MAX_REPLICAS_PER_NODE",
        default_value = "1000",
        help = "Per-node replica ceiling before resources are considered"
    )]
    pub max_replicas_per_node: u64,
}

impl PredictorArgs {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.port)
    }
}

impl From<&PredictorArgs> for EstimateOptions {
    fn from(args: &PredictorArgs) -> Self {
        Self {
            exhausted_annotation: args.exhausted_annotation.clone(),
            exhausted_value: args.exhausted_value.clone(),
            capacity_annotation: args.capacity_annotation.clone(),
            max_replicas_per_node: args.max_replicas_per_node,
        }
    }
}
