//! Liveness and readiness handlers for the probe listener.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::ProbeState;
use crate::handlers::StatusBody;

/// GET /healthz
pub async fn healthz() -> Json<StatusBody> {
    StatusBody::new("ok")
}

/// GET /readyz
///
/// `503` bodies are plain text so they read cleanly in `kubectl describe`.
pub async fn readyz(State(state): State<ProbeState>) -> Response {
    let synced = state.backend.has_synced();
    match state
        .gate
        .check(synced, state.backend.probe_connectivity())
        .await
    {
        Ok(()) => StatusBody::new("ready").into_response(),
        Err(reason) => (StatusCode::SERVICE_UNAVAILABLE, reason.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::memory::MemoryBackend;
    use http_body_util::BodyExt;
    use replicant_health::{GateState, ReadinessGate};
    use std::sync::Arc;
    use std::time::Duration;

    fn probe_state() -> (ProbeState, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let state = ProbeState {
            backend: backend.clone(),
            gate: Arc::new(ReadinessGate::default()),
        };
        (state, backend)
    }

    async fn body_text(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn healthz_is_always_ok() {
        let Json(body) = healthz().await;
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn readyz_unsynced_is_503() {
        let (state, _backend) = probe_state();
        let resp = readyz(State(state)).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(resp).await, "cache not synced");
    }

    #[tokio::test]
    async fn readyz_synced_and_reachable_is_200() {
        let (state, backend) = probe_state();
        backend.sync_flag().mark_synced();

        let resp = readyz(State(state.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.gate.state(), GateState::Ready);
    }

    #[tokio::test]
    async fn readyz_reports_probe_error_text() {
        let (state, backend) = probe_state();
        backend.sync_flag().mark_synced();
        backend.fail_probe(BackendError::Cluster(
            "kubernetes connectivity check failed: connection refused".into(),
        ));

        let resp = readyz(State(state)).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_text(resp).await.contains("connection refused"));
    }

    #[tokio::test(start_paused = true)]
    async fn readyz_slow_probe_is_503() {
        let (state, backend) = probe_state();
        backend.sync_flag().mark_synced();
        backend.delay_cluster_calls(Duration::from_secs(30));

        let resp = readyz(State(state)).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(body_text(resp).await.contains("timed out"));
    }
}
