//! Event reconciler: the single writer of the replica store.
//!
//! Consumes [`WatchEvent`]s from one channel in delivery order and applies
//! them to the [`ReplicaStore`]. Owns the [`SyncFlag`] transition. Bad
//! events are logged and dropped; nothing here returns an error or retries.

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::event::{CacheOp, WatchEvent};
use crate::store::ReplicaStore;
use crate::sync::SyncFlag;

/// Counters reported when the reconcile loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerStats {
    /// Events that changed (or re-confirmed) store state.
    pub applied: u64,
    /// Events discarded as malformed.
    pub dropped: u64,
}

/// Applies watch events to a replica store.
#[derive(Clone, Debug)]
pub struct Reconciler {
    store: ReplicaStore,
    sync: SyncFlag,
}

impl Reconciler {
    pub fn new(store: ReplicaStore, sync: SyncFlag) -> Self {
        Self { store, sync }
    }

    /// The store this reconciler writes to.
    pub fn store(&self) -> &ReplicaStore {
        &self.store
    }

    /// The sync flag this reconciler owns.
    pub fn sync_flag(&self) -> &SyncFlag {
        &self.sync
    }

    /// Apply a single event. Returns `false` if the event was dropped.
    pub fn apply(&self, event: WatchEvent) -> bool {
        match event.into_op() {
            Ok(CacheOp::Upsert { name, replicas }) => {
                self.store.apply_upsert(&name, replicas);
            }
            Ok(CacheOp::Delete { name }) => {
                self.store.apply_delete(&name);
            }
            Ok(CacheOp::SyncComplete) => {
                if self.sync.mark_synced() {
                    info!(deployments = self.store.len(), "replica cache synced");
                } else {
                    debug!("relist complete, cache already synced");
                }
            }
            Err(reason) => {
                warn!(%reason, "dropping watch event");
                return false;
            }
        }
        true
    }

    /// Run the reconcile loop until the event channel closes or `shutdown`
    /// fires.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ReconcilerStats {
        let mut stats = ReconcilerStats::default();
        info!("reconciler started");

        loop {
            tokio::select! {
                // Drain what is already queued before honoring shutdown.
                biased;

                event = events.recv() => match event {
                    Some(event) => {
                        if self.apply(event) {
                            stats.applied += 1;
                        } else {
                            stats.dropped += 1;
                        }
                    }
                    None => {
                        info!("event source closed, reconciler stopping");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }

        if !self.sync.has_synced() {
            warn!("reconciler stopped before the initial sync completed");
        }
        info!(applied = stats.applied, dropped = stats.dropped, "reconciler stopped");
        stats
    }
}
