//! Replica-count mutations.

use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use kube::Api;
use kube::api::{Patch, PatchParams};
use replicant_api::BackendError;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::patch_error;

/// Sends `spec.replicas` merge patches to the API server.
///
/// The gateway never touches the replica cache: an accepted patch shows up
/// there only once the watch delivers the resulting update.
#[derive(Clone)]
pub struct MutationGateway {
    api: Api<Deployment>,
    timeout: Duration,
}

impl MutationGateway {
    pub fn new(api: Api<Deployment>, timeout: Duration) -> Self {
        Self { api, timeout }
    }

    pub async fn set_replicas(&self, name: &str, replicas: i32) -> Result<(), BackendError> {
        let body = replicas_patch(replicas);
        let params = PatchParams::default();
        let merge = Patch::Merge(&body);
        let patch = self.api.patch(name, &params, &merge);

        match tokio::time::timeout(self.timeout, patch).await {
            Ok(Ok(_)) => {
                debug!(%name, replicas, "replica patch accepted");
                Ok(())
            }
            Ok(Err(e)) => Err(patch_error(name, e)),
            Err(_) => Err(BackendError::Timeout(self.timeout)),
        }
    }
}

/// Merge patch touching only `spec.replicas`.
pub fn replicas_patch(replicas: i32) -> Value {
    json!({ "spec": { "replicas": replicas } })
}
