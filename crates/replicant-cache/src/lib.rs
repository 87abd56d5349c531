//! replicant-cache: watch-driven replica cache for Replicant.
//!
//! Keeps the last observed desired replica count of every Deployment in
//! the watched namespace, so reads never touch the cluster API.
//!
//! # Architecture
//!
//! ```text
//! Cluster watch ──WatchEvent──▶ mpsc ──▶ Reconciler ──CacheOp──▶ ReplicaStore
//!                                           │
//!                                           └── SyncFlag (false → true, once)
//! ```
//!
//! The `ReplicaStore` and `SyncFlag` are `Clone` handles over shared state.
//! They are constructed explicitly and passed to every component that
//! needs them, so several independent caches can coexist in one process.

pub mod event;
pub mod reconciler;
pub mod store;
pub mod sync;

pub use event::{CacheOp, DeletedObject, DropReason, WatchEvent};
pub use reconciler::{Reconciler, ReconcilerStats};
pub use store::ReplicaStore;
pub use sync::SyncFlag;
