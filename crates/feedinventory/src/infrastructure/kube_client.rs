use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;
use tracing::info;

use crate::infrastructure::k8s::KubernetesError;

/// Builds a client from `kubeconfig`, or from the in-cluster / default
/// configuration when no path is given. `master` overrides the API server URL.
pub async fn init_kube_client(
    kubeconfig: Option<PathBuf>,
    master: Option<String>,
) -> Result<Client, Report<KubernetesError>> {
    let mut config = match kubeconfig {
        Some(kubeconfig_path) => {
            let kubeconfig = Kubeconfig::read_from(&kubeconfig_path).change_context(
                KubernetesError::ConnectionFailed {
                    message: format!(
                        "Failed to read kubeconfig file: {}",
                        kubeconfig_path.display()
                    ),
                },
            )?;

            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .change_context(KubernetesError::ConnectionFailed {
                    message: format!(
                        "Failed to create config from kubeconfig: {}",
                        kubeconfig_path.display()
                    ),
                })?
        }
        None => Config::infer()
            .await
            .change_context(KubernetesError::ConnectionFailed {
                message: "Failed to infer Kubernetes configuration".to_string(),
            })?,
    };

    if let Some(master) = master {
        config.cluster_url = master
            .parse::<http::Uri>()
            .change_context(KubernetesError::ConnectionFailed {
                message: format!("Invalid master URL: {master}"),
            })?;
    }
    info!(cluster_url = %config.cluster_url, "Using Kubernetes API server");

    Client::try_from(config).change_context(KubernetesError::ConnectionFailed {
        message: "Failed to create Kubernetes client".to_string(),
    })
}
