//! Cluster client construction.

use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, Client};
use tracing::info;

use crate::error::KubeError;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// The Deployment API scoped to the one namespace Replicant manages.
#[derive(Clone)]
pub struct DeploymentApi {
    api: Api<Deployment>,
    namespace: String,
}

impl DeploymentApi {
    /// Build a client from the ambient configuration (kubeconfig, then
    /// in-cluster service account) and scope it to `namespace`.
    pub async fn connect(namespace: &str) -> Result<Self, KubeError> {
        let client = Client::try_default().await.map_err(KubeError::Client)?;
        let api = Self::from_client(client, namespace);
        info!(namespace = %api.namespace, "kubernetes client ready");
        Ok(api)
    }

    pub fn from_client(client: Client, namespace: &str) -> Self {
        let namespace = effective_namespace(namespace).to_string();
        Self {
            api: Api::namespaced(client, &namespace),
            namespace,
        }
    }

    pub fn api(&self) -> &Api<Deployment> {
        &self.api
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl std::fmt::Debug for DeploymentApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentApi")
            .field("namespace", &self.namespace)
            .finish()
    }
}

/// An empty namespace means [`DEFAULT_NAMESPACE`].
pub fn effective_namespace(namespace: &str) -> &str {
    if namespace.is_empty() {
        DEFAULT_NAMESPACE
    } else {
        namespace
    }
}
