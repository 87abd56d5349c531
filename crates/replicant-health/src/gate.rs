//! Readiness gate state machine.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

/// Default bound on a single connectivity probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Observable gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    NotReady,
    Ready,
}

/// Why a readiness check failed. The `Display` text is the probe body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotReady {
    #[error("cache not synced")]
    CacheNotSynced,

    #[error("connectivity probe timed out after {0:?}")]
    ProbeTimedOut(Duration),

    #[error("{0}")]
    ProbeFailed(String),
}

/// One-way readiness latch with a bounded connectivity probe.
#[derive(Debug)]
pub struct ReadinessGate {
    ready: AtomicBool,
    probe_timeout: Duration,
}

impl ReadinessGate {
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            ready: AtomicBool::new(false),
            probe_timeout,
        }
    }

    /// Current state. `Ready` once any check has passed.
    pub fn state(&self) -> GateState {
        if self.ready.load(Ordering::Acquire) {
            GateState::Ready
        } else {
            GateState::NotReady
        }
    }

    /// Run one readiness check.
    ///
    /// `synced` is only consulted until the gate first latches `Ready`.
    /// `probe` always runs (unless the cache is unsynced) and is dropped if
    /// it does not finish within the probe timeout.
    pub async fn check<F, E>(&self, synced: bool, probe: F) -> Result<(), NotReady>
    where
        F: Future<Output = Result<(), E>>,
        E: Display,
    {
        if self.state() == GateState::NotReady && !synced {
            return Err(NotReady::CacheNotSynced);
        }

        match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "readiness probe failed");
                return Err(NotReady::ProbeFailed(e.to_string()));
            }
            Err(_) => {
                debug!(timeout = ?self.probe_timeout, "readiness probe timed out");
                return Err(NotReady::ProbeTimedOut(self.probe_timeout));
            }
        }

        if !self.ready.swap(true, Ordering::AcqRel) {
            info!("readiness gate is now ready");
        }
        Ok(())
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}
