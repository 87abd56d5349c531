//! REST API handlers.
//!
//! Reads come from the backend's cache. `POST .../replicas` validates the
//! body strictly, then forwards the intent to the cluster. The request
//! deadline is applied around the whole router, see [`request_failed`].

use axum::BoxError;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ApiState;
use crate::backend::BackendError;

/// Body of `GET /deployments`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentList {
    pub deployments: Vec<String>,
}

/// Body of `GET /deployments/{name}/replicas`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaCount {
    pub name: String,
    pub replicas: i32,
}

/// Body of `POST /deployments/{name}/replicas`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetReplicasRequest {
    pub replicas: i32,
}

/// `{"status": ...}` acknowledgement.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusBody {
    pub status: String,
}

impl StatusBody {
    pub fn new(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
        })
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    (status, Json(ErrorBody { error: msg })).into_response()
}

// ── Deployments ────────────────────────────────────────────────

/// GET /api/v1/deployments
pub async fn list_deployments(State(state): State<ApiState>) -> Json<DeploymentList> {
    let mut deployments = state.backend.list_deployments();
    deployments.sort();
    Json(DeploymentList { deployments })
}

// ── Replicas ───────────────────────────────────────────────────

/// GET /api/v1/deployments/{name}/replicas
pub async fn get_replicas(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.backend.get_replicas(&name) {
        Some(replicas) => Json(ReplicaCount { name, replicas }).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "deployment not found"),
    }
}

/// POST /api/v1/deployments/{name}/replicas
pub async fn set_replicas(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    // from_slice rejects unknown fields, a missing field, and trailing data.
    let req: SetReplicasRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            debug!(%name, error = %e, "rejected replica update body");
            return error_response(StatusCode::BAD_REQUEST, "invalid json body");
        }
    };

    if req.replicas < 0 {
        return error_response(StatusCode::BAD_REQUEST, "replicas must be >= 0");
    }

    match state.backend.set_replicas(&name, req.replicas).await {
        Ok(()) => {
            info!(%name, replicas = req.replicas, "replica update accepted");
            StatusBody::new("updated").into_response()
        }
        Err(BackendError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "deployment not found")
        }
        Err(e) => {
            warn!(%name, error = %e, "replica update failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

// ── Middleware errors ──────────────────────────────────────────

/// Maps failures of the deadline layer to responses.
pub async fn request_failed(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        warn!("request exceeded deadline");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "request deadline exceeded")
    } else {
        warn!(error = %err, "request failed in middleware");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
    }
}
