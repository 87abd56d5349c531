//! replicant-api: REST API for Replicant.
//!
//! Provides axum routers for the authenticated API listener and the
//! unauthenticated probe listener. Handlers depend only on the
//! [`ReplicaBackend`] capability set, never on a concrete cache.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/deployments` | List cached deployment names, sorted |
//! | GET | `/api/v1/deployments/{name}/replicas` | Cached desired replicas |
//! | POST | `/api/v1/deployments/{name}/replicas` | Request a new replica count |
//!
//! # Probe Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | Liveness, always `200` |
//! | GET | `/readyz` | Readiness gate, `200` or `503` with a plain-text reason |

pub mod backend;
pub mod handlers;
pub mod memory;
pub mod probes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::routing::get;
use replicant_health::ReadinessGate;
use tower::ServiceBuilder;
use tower::timeout::TimeoutLayer;

pub use backend::{BackendError, BoxFuture, ReplicaBackend};
pub use memory::MemoryBackend;

/// Default deadline for a whole request, body read included.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub backend: Arc<dyn ReplicaBackend>,
}

/// Shared state for probe handlers.
#[derive(Clone)]
pub struct ProbeState {
    pub backend: Arc<dyn ReplicaBackend>,
    pub gate: Arc<ReadinessGate>,
}

/// Build the API router (mounted under `/api/v1`).
///
/// Every request, from the first body byte to the response, runs under
/// `request_timeout`.
pub fn build_router(backend: Arc<dyn ReplicaBackend>, request_timeout: Duration) -> Router {
    let api_routes = Router::new()
        .route("/deployments", get(handlers::list_deployments))
        .route("/deployments/", get(handlers::list_deployments))
        .route(
            "/deployments/{name}/replicas",
            get(handlers::get_replicas).post(handlers::set_replicas),
        )
        .with_state(ApiState { backend });

    with_deadline(Router::new().nest("/api/v1", api_routes), request_timeout)
}

/// Build the probe router (`/healthz`, `/readyz`).
pub fn build_probe_router(
    backend: Arc<dyn ReplicaBackend>,
    gate: Arc<ReadinessGate>,
    request_timeout: Duration,
) -> Router {
    let router = Router::new()
        .route("/healthz", get(probes::healthz))
        .route("/readyz", get(probes::readyz))
        .with_state(ProbeState { backend, gate });

    with_deadline(router, request_timeout)
}

fn with_deadline(router: Router, request_timeout: Duration) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handlers::request_failed))
            .layer(TimeoutLayer::new(request_timeout)),
    )
}
