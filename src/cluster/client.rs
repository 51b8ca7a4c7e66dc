//! Minimal in-cluster Kubernetes API client
//!
//! Authenticates with the pod's service account and lists pods by node.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{ClusterError, ContainerStatus, PodInfo, PodLister};

/// Where Kubernetes mounts the service account credentials.
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Per-request timeout for API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Kubernetes API client scoped to the pod listing the recorder needs.
#[derive(Clone)]
pub struct KubeClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl KubeClient {
    /// Build a client from the in-cluster environment.
    pub fn in_cluster() -> Result<Self, ClusterError> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| ClusterError::Config("KUBERNETES_SERVICE_HOST not set".to_string()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT")
            .map_err(|_| ClusterError::Config("KUBERNETES_SERVICE_PORT not set".to_string()))?;
        Self::from_service_account(&api_server_url(&host, &port), Path::new(SERVICE_ACCOUNT_DIR))
    }

    /// Build a client from an API server URL and a service account directory
    /// holding `token` and `ca.crt`.
    pub fn from_service_account(base_url: &str, dir: &Path) -> Result<Self, ClusterError> {
        let token = read_credential(&dir.join("token"))?;
        let ca = std::fs::read(dir.join("ca.crt"))
            .map_err(|e| ClusterError::Config(format!("read ca.crt: {}", e)))?;
        let cert = reqwest::Certificate::from_pem(&ca)?;

        let http = reqwest::Client::builder()
            .add_root_certificate(cert)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        })
    }
}

#[tonic::async_trait]
impl PodLister for KubeClient {
    async fn list_node_pods(&self, node_name: &str) -> Result<Vec<PodInfo>, ClusterError> {
        let url = format!("{}/api/v1/pods", self.base_url);
        let list: PodList = self
            .http
            .get(&url)
            .query(&[("fieldSelector", format!("spec.nodeName={}", node_name))])
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(node = node_name, pods = list.items.len(), "Listed node pods");
        Ok(list.into_pods())
    }
}

fn read_credential(path: &Path) -> Result<String, ClusterError> {
    std::fs::read_to_string(path)
        .map_err(|e| ClusterError::Config(format!("read {}: {}", path.display(), e)))
}

fn api_server_url(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("https://[{}]:{}", host, port)
    } else {
        format!("https://{}:{}", host, port)
    }
}

// Only the fields the recorder reads from the v1 PodList.

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    annotations: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatus {
    #[serde(default)]
    container_statuses: Vec<RawContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct RawContainerStatus {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "containerID")]
    container_id: String,
}

impl PodList {
    fn into_pods(self) -> Vec<PodInfo> {
        self.items
            .into_iter()
            .map(|pod| PodInfo {
                name: pod.metadata.name,
                namespace: pod.metadata.namespace,
                annotations: pod.metadata.annotations,
                containers: pod
                    .status
                    .container_statuses
                    .into_iter()
                    .map(|status| ContainerStatus {
                        name: status.name,
                        container_id: status.container_id,
                    })
                    .collect(),
            })
            .collect()
    }
}
