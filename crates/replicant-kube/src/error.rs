use replicant_api::BackendError;
use thiserror::Error;

/// Failures setting up the cluster connection.
#[derive(Debug, Error)]
pub enum KubeError {
    #[error("failed to build kubernetes client: {0}")]
    Client(#[source] kube::Error),
}

/// Whether a kube error is the API server reporting a missing object.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

/// Classify a failed replica patch for the router.
pub fn patch_error(name: &str, err: kube::Error) -> BackendError {
    if is_not_found(&err) {
        BackendError::NotFound(name.to_string())
    } else {
        BackendError::Cluster(format!("failed to update deployment {name}: {err}"))
    }
}
