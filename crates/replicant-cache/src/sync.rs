//! Monotonic "has synced once" flag.
//!
//! Starts `false` and flips to `true` after the initial list has been
//! applied to the store. It never goes back to `false`, even if the watch
//! later disconnects and relists.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared, one-way sync flag.
#[derive(Clone, Debug)]
pub struct SyncFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl SyncFlag {
    /// Create an unsynced flag.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Whether the cache has completed its initial sync.
    pub fn has_synced(&self) -> bool {
        *self.tx.borrow()
    }

    /// Mark the cache as synced. Returns `true` only for the call that
    /// performed the transition.
    pub fn mark_synced(&self) -> bool {
        self.tx.send_if_modified(|synced| {
            if *synced {
                false
            } else {
                *synced = true;
                true
            }
        })
    }

    /// Wait until the flag is set. Returns immediately if it already is.
    pub async fn wait_synced(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|synced| *synced).await;
    }
}

impl Default for SyncFlag {
    fn default() -> Self {
        Self::new()
    }
}
