//! replicant-health: readiness gating for Replicant.
//!
//! The gate has two states, `NotReady` and `Ready`, and only moves forward.
//! It enters `Ready` the first time the replica cache reports an initial
//! sync *and* a connectivity probe against the cluster succeeds in time.
//!
//! ```text
//! ReadinessGate::check(synced, probe)
//!   ├── latched?  no  → synced? no → NotReady(CacheNotSynced)
//!   ├── probe within timeout?  no → NotReady(ProbeTimedOut | ProbeFailed)
//!   └── latch Ready, return Ok
//! ```
//!
//! The sync latch is sticky; the probe is re-run on every check, so a
//! cluster outage after the initial sync still fails readiness.

pub mod gate;

pub use gate::{GateState, NotReady, ReadinessGate};
