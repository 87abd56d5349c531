//! ReplicaStore: in-memory map of deployment name to desired replicas.
//!
//! The single source of truth for reads. Only the reconciler writes to it;
//! request handlers read. Every critical section is a single map operation
//! with no I/O, so readers and the writer never wait on each other for long.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

/// Thread-safe replica cache keyed by deployment name.
#[derive(Clone, Default)]
pub struct ReplicaStore {
    replicas: Arc<RwLock<HashMap<String, i32>>>,
}

impl ReplicaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current deployment names, in no particular order.
    pub fn list(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Desired replicas for `name`, or `None` if the cache has never seen it.
    ///
    /// `None` means "unknown to the cache" and must surface as not-found,
    /// never as zero replicas.
    pub fn get(&self, name: &str) -> Option<i32> {
        self.read().get(name).copied()
    }

    /// Insert or overwrite the replica count for `name`. Last write wins.
    pub fn apply_upsert(&self, name: &str, replicas: i32) {
        let previous = self.write().insert(name.to_string(), replicas);
        debug!(%name, replicas, ?previous, "replica record upserted");
    }

    /// Remove `name`. Removing an absent name is a no-op.
    pub fn apply_delete(&self, name: &str) {
        let existed = self.write().remove(name).is_some();
        debug!(%name, existed, "replica record deleted");
    }

    /// Number of cached deployments.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the cache holds no deployments.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Map operations never panic halfway, so a poisoned guard still holds a
    // consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, i32>> {
        self.replicas.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, i32>> {
        self.replicas.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ReplicaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicaStore")
            .field("deployments", &self.len())
            .finish()
    }
}
