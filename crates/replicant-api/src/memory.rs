//! In-process backend.
//!
//! Serves reads from a [`ReplicaStore`] that something else (usually a
//! [`Reconciler`](replicant_cache::Reconciler)) keeps up to date, and
//! records write intents instead of sending them anywhere. Used by the
//! router tests and by `replicantd` integration tests.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use replicant_cache::{ReplicaStore, SyncFlag};
use tracing::debug;

use crate::backend::{BackendError, BoxFuture, ReplicaBackend};

#[derive(Debug, Default)]
struct Faults {
    set_replicas: Option<BackendError>,
    probe: Option<BackendError>,
    delay: Option<Duration>,
}

/// A [`ReplicaBackend`] with no cluster behind it.
#[derive(Debug)]
pub struct MemoryBackend {
    store: ReplicaStore,
    sync: SyncFlag,
    mutations: Mutex<Vec<(String, i32)>>,
    faults: Mutex<Faults>,
}

impl MemoryBackend {
    /// Fresh, unsynced backend with an empty store.
    pub fn new() -> Self {
        Self::with_cache(ReplicaStore::new(), SyncFlag::new())
    }

    /// Backend reading from an existing store and sync flag.
    pub fn with_cache(store: ReplicaStore, sync: SyncFlag) -> Self {
        Self {
            store,
            sync,
            mutations: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn store(&self) -> &ReplicaStore {
        &self.store
    }

    pub fn sync_flag(&self) -> &SyncFlag {
        &self.sync
    }

    /// Every accepted `set_replicas` call, oldest first.
    pub fn mutations(&self) -> Vec<(String, i32)> {
        lock(&self.mutations).clone()
    }

    /// Make every later `set_replicas` call fail with `err`.
    pub fn fail_set_replicas(&self, err: BackendError) {
        lock(&self.faults).set_replicas = Some(err);
    }

    /// Make every later connectivity probe fail with `err`.
    pub fn fail_probe(&self, err: BackendError) {
        lock(&self.faults).probe = Some(err);
    }

    /// Clear injected failures.
    pub fn heal(&self) {
        let mut faults = lock(&self.faults);
        faults.set_replicas = None;
        faults.probe = None;
    }

    /// Delay every later cluster-facing call by `delay`.
    pub fn delay_cluster_calls(&self, delay: Duration) {
        lock(&self.faults).delay = Some(delay);
    }

    async fn simulate_latency(&self) {
        let delay = lock(&self.faults).delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicaBackend for MemoryBackend {
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
        Box::pin(async move {
            self.simulate_latency().await;

            if let Some(err) = lock(&self.faults).set_replicas.clone() {
                return Err(err);
            }
            // The cache stands in for the cluster's view of what exists.
            if self.store.get(name).is_none() {
                return Err(BackendError::NotFound(name.to_string()));
            }

            debug!(%name, replicas, "recorded replica update");
            lock(&self.mutations).push((name.to_string(), replicas));
            Ok(())
        })
    }

    fn has_synced(&self) -> bool {
        self.sync.has_synced()
    }

    fn probe_connectivity(&self) -> BoxFuture<'_, Result<(), BackendError>> {
        Box::pin(async move {
            self.simulate_latency().await;
            match lock(&self.faults).probe.clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        })
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
