//! The capability set the routers depend on.
//!
//! Reads are served from the local cache and never block on the cluster.
//! Writes and connectivity probes go to the cluster and return boxed
//! futures so the trait stays object-safe behind `Arc<dyn ReplicaBackend>`.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

/// Boxed future alias for backend calls that reach the cluster.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Cluster-facing failures, propagated verbatim to the router.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("deployment {0} not found")]
    NotFound(String),

    #[error("cluster call timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Cluster(String),
}

/// Replica reads, replica writes, and readiness inputs.
pub trait ReplicaBackend: Send + Sync {
    /// Cached deployment names, in no particular order.
    fn list_deployments(&self) -> Vec<String>;

    /// Cached desired replicas, or `None` if the cache has never seen `name`.
    fn get_replicas(&self, name: &str) -> Option<i32>;

    /// Ask the cluster to change the desired replicas of `name`.
    ///
    /// Success means the cluster accepted the intent. The cache converges
    /// later, through the watch; this call never writes to it.
    fn set_replicas<'a>(
        &'a self,
        name: &'a str,
        replicas: i32,
    ) -> BoxFuture<'a, Result<(), BackendError>>;

    /// Whether the cache has completed its initial sync.
    fn has_synced(&self) -> bool;

    /// Lightweight round trip proving the cluster API is reachable.
    fn probe_connectivity(&self) -> BoxFuture<'_, Result<(), BackendError>>;
}
