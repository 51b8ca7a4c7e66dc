//! Cluster pod lookup
//!
//! The event pipeline only needs one query from Kubernetes: "which pods run
//! on this node, with which container IDs and annotations". [`PodLister`]
//! captures that; [`KubeClient`] implements it against the API server.

mod client;

use std::collections::HashMap;

use thiserror::Error;

pub use client::KubeClient;

/// A pod scheduled on the local node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodInfo {
    /// Pod name.
    pub name: String,
    /// Pod namespace.
    pub namespace: String,
    /// Pod annotations.
    pub annotations: HashMap<String, String>,
    /// Status of each container in the pod.
    pub containers: Vec<ContainerStatus>,
}

/// Runtime status of one container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStatus {
    /// Container name from the pod spec.
    pub name: String,
    /// Runtime-prefixed ID, e.g. `containerd://<64 hex>`; empty until the
    /// container has started.
    pub container_id: String,
}

/// Errors talking to the cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// In-cluster configuration is missing or unreadable.
    #[error("get in-cluster config: {0}")]
    Config(String),

    /// The API request failed.
    #[error("list node pods: {0}")]
    Request(#[from] reqwest::Error),
}

/// Lists pods scheduled on a node.
#[tonic::async_trait]
pub trait PodLister: Send + Sync {
    /// Pods whose `spec.nodeName` is `node_name`.
    async fn list_node_pods(&self, node_name: &str) -> Result<Vec<PodInfo>, ClusterError>;
}
