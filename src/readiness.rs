//! Cluster readiness gate
//!
//! A coarse, service-wide circuit breaker: unless the orchestration platform
//! reports at least one running Vault pod, no node is probed or unsealed.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    api::{Api, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config, ResourceExt,
};
use tracing::debug;

use crate::config::K8sConfig;
use crate::error::{Error, Result};

/// Reports whether the managed service has a healthy backing instance
#[async_trait]
pub trait ReadinessGate: Send + Sync {
    async fn is_ready(&self) -> Result<bool>;
}

/// [`ReadinessGate`] backed by the Kubernetes pod list
#[derive(Clone)]
pub struct PodReadinessGate {
    pods: Api<Pod>,
    namespace: String,
    label_selector: String,
}

impl PodReadinessGate {
    pub fn new(client: Client, namespace: &str, label_selector: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            label_selector: label_selector.to_string(),
        }
    }

    /// Build the Kubernetes client described by `config` and bind the gate to it
    pub async fn connect(config: &K8sConfig) -> Result<Self> {
        let client = kube_client(config).await?;
        Ok(Self::new(client, &config.namespace, &config.label_selector))
    }

    /// Names of the Vault pods currently in the `Running` phase
    pub async fn running_pods(&self) -> Result<Vec<String>> {
        let pods = self
            .pods
            .list(&ListParams::default().labels(&self.label_selector))
            .await
            .map_err(Error::KubeError)?;

        Ok(pods
            .items
            .iter()
            .filter(|pod| is_pod_running(pod))
            .map(|pod| pod.name_any())
            .collect())
    }
}

#[async_trait]
impl ReadinessGate for PodReadinessGate {
    async fn is_ready(&self) -> Result<bool> {
        let running = self.running_pods().await?;
        debug!(
            "Running Vault pods in {} ({}): {:?}",
            self.namespace, self.label_selector, running
        );
        Ok(!running.is_empty())
    }
}

/// Sealed Vault pods fail their readiness probe, so the `Running` phase is
/// the signal rather than the `Ready` condition.
fn is_pod_running(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some("Running")
}

/// Create a Kubernetes client from in-cluster credentials or a kubeconfig
pub async fn kube_client(config: &K8sConfig) -> Result<Client> {
    let kube_config = if config.in_cluster {
        Config::incluster()
            .map_err(|e| Error::ConfigError(format!("in-cluster config unavailable: {}", e)))?
    } else if let Some(path) = &config.config_path {
        let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
            Error::ConfigError(format!("cannot read kubeconfig '{}': {}", path.display(), e))
        })?;
        Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::ConfigError(format!("invalid kubeconfig: {}", e)))?
    } else {
        Config::infer()
            .await
            .map_err(|e| Error::ConfigError(format!("cannot infer Kubernetes config: {}", e)))?
    };

    Ok(Client::try_from(kube_config)?)
}
