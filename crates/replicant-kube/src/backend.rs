//! The production backend: cached reads, cluster writes and probes.

use k8s_openapi::api::apps::v1::Deployment;
use kube::Api;
use kube::api::ListParams;
use replicant_api::{BackendError, BoxFuture, ReplicaBackend};
use replicant_cache::{ReplicaStore, SyncFlag};

use crate::gateway::MutationGateway;

pub struct KubeBackend {
    store: ReplicaStore,
    sync: SyncFlag,
    gateway: MutationGateway,
    api: Api<Deployment>,
}

impl KubeBackend {
    pub fn new(
        store: ReplicaStore,
        sync: SyncFlag,
        gateway: MutationGateway,
        api: Api<Deployment>,
    ) -> Self {
        Self {
            store,
            sync,
            gateway,
            api,
        }
    }
}

impl ReplicaBackend for KubeBackend {
    fn list_deployments(&self) -> Vec<String> {
        self.store.list()
    }

    fn get_replicas(&self, name: &str) -> Option<i32> {
        self.store.get(name)
    }

    fn set_replicas<'a>(
        &'a self,
        name: &'a str,
        replicas: i32,
    ) -> BoxFuture<'a, Result<(), BackendError>> {
        Box::pin(self.gateway.set_replicas(name, replicas))
    }

    fn has_synced(&self) -> bool {
        self.sync.has_synced()
    }

    /// Lists at most one Deployment in the managed namespace.
    fn probe_connectivity(&self) -> BoxFuture<'_, Result<(), BackendError>> {
        Box::pin(async move {
            self.api
                .list(&ListParams::default().limit(1))
                .await
                .map(|_| ())
                .map_err(|e| {
                    BackendError::Cluster(format!("kubernetes connectivity check failed: {e}"))
                })
        })
    }
}
