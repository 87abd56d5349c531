//! Typed watch events and their translation into cache operations.
//!
//! The watch layer pushes [`WatchEvent`]s carrying whole Deployment
//! objects. The reconciler reduces each one to at most one [`CacheOp`];
//! events that cannot be reduced translate to a [`DropReason`] and are
//! dropped.

use k8s_openapi::api::apps::v1::Deployment;

/// A notification from the cluster event source.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A Deployment appeared, either from the initial list or a live watch.
    Added(Deployment),
    /// A known Deployment changed.
    Updated(Deployment),
    /// A Deployment was removed.
    Deleted(DeletedObject),
    /// The initial list, and every event queued before this one, has been
    /// delivered.
    Synced,
}

/// Payload of a delete notification.
#[derive(Debug, Clone)]
pub enum DeletedObject {
    /// The watch observed the delete and carries the final object.
    Known(Deployment),
    /// The watch missed the delete (for example across a reconnect) and
    /// only knows the object is gone. `key` is `namespace/name`.
    FinalStateUnknown {
        key: String,
        last_known: Option<Deployment>,
    },
}

/// A single mutation of the replica store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp {
    Upsert { name: String, replicas: i32 },
    Delete { name: String },
    SyncComplete,
}

/// Reasons a watch event is dropped instead of applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingName,
    NegativeReplicas(i32),
    UnrecoverableTombstone,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::MissingName => write!(f, "object has no name"),
            DropReason::NegativeReplicas(n) => write!(f, "negative replica count {n}"),
            DropReason::UnrecoverableTombstone => {
                write!(f, "no name recoverable from delete tombstone")
            }
        }
    }
}

impl WatchEvent {
    /// Reduce this event to a store operation.
    pub fn into_op(self) -> Result<CacheOp, DropReason> {
        match self {
            WatchEvent::Added(d) | WatchEvent::Updated(d) => {
                let name = deployment_name(&d).ok_or(DropReason::MissingName)?;
                let replicas = desired_replicas(&d);
                if replicas < 0 {
                    return Err(DropReason::NegativeReplicas(replicas));
                }
                Ok(CacheOp::Upsert { name, replicas })
            }
            WatchEvent::Deleted(obj) => obj.name().map(|name| CacheOp::Delete { name }),
            WatchEvent::Synced => Ok(CacheOp::SyncComplete),
        }
    }
}

impl DeletedObject {
    /// Recover the deployment name, unwrapping a tombstone if needed.
    pub fn name(&self) -> Result<String, DropReason> {
        match self {
            DeletedObject::Known(d) => deployment_name(d).ok_or(DropReason::MissingName),
            DeletedObject::FinalStateUnknown { key, last_known } => last_known
                .as_ref()
                .and_then(deployment_name)
                .or_else(|| name_from_key(key))
                .ok_or(DropReason::UnrecoverableTombstone),
        }
    }
}

/// Non-empty `metadata.name` of a Deployment.
pub fn deployment_name(d: &Deployment) -> Option<String> {
    d.metadata.name.clone().filter(|n| !n.is_empty())
}

/// `spec.replicas`, with an absent spec or field read as zero.
pub fn desired_replicas(d: &Deployment) -> i32 {
    d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0)
}

/// Name part of a `namespace/name` key. A key without `/` is the name.
fn name_from_key(key: &str) -> Option<String> {
    let name = key.rsplit('/').next().unwrap_or_default();
    (!name.is_empty()).then(|| name.to_string())
}
