//! End-to-end regression tests.
//!
//! Drives the API and probe routers against a reconciler-fed cache with a
//! scripted event sequence, the way the watch would in production.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use replicant_api::{BackendError, MemoryBackend, build_probe_router, build_router};
use replicant_cache::{DeletedObject, Reconciler, ReplicaStore, SyncFlag, WatchEvent};
use replicant_health::ReadinessGate;
use tokio::sync::{mpsc, watch};
use tower::ServiceExt;

fn deployment(name: &str, replicas: i32) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            ..Default::default()
        }),
        ..Default::default()
    }
}

struct Harness {
    api: Router,
    probes: Router,
    backend: Arc<MemoryBackend>,
    events: mpsc::Sender<WatchEvent>,
    sync: SyncFlag,
    store: ReplicaStore,
    _shutdown: watch::Sender<bool>,
}

fn harness() -> Harness {
    let store = ReplicaStore::new();
    let sync = SyncFlag::new();
    let backend = Arc::new(MemoryBackend::with_cache(store.clone(), sync.clone()));

    let (events, rx) = mpsc::channel(64);
    let (shutdown, shutdown_rx) = watch::channel(false);
    tokio::spawn(Reconciler::new(store.clone(), sync.clone()).run(rx, shutdown_rx));

    Harness {
        api: build_router(backend.clone(), Duration::from_secs(10)),
        probes: build_probe_router(
            backend.clone(),
            Arc::new(ReadinessGate::default()),
            Duration::from_secs(10),
        ),
        backend,
        events,
        sync,
        store,
        _shutdown: shutdown,
    }
}

async fn call(router: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Wait until the reconciler has caught up to a condition on the store.
async fn settle(store: &ReplicaStore, check: impl Fn(&ReplicaStore) -> bool) {
    for _ in 0..200 {
        if check(store) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("store never reached expected state: {store:?}");
}

#[tokio::test]
async fn scale_request_converges_through_watch() {
    let h = harness();

    h.events.send(WatchEvent::Added(deployment("frontend", 3))).await.unwrap();
    h.events.send(WatchEvent::Added(deployment("worker", 1))).await.unwrap();
    h.events.send(WatchEvent::Synced).await.unwrap();
    h.sync.wait_synced().await;

    let (status, body) = call(&h.api, Method::GET, "/api/v1/deployments", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"deployments":["frontend","worker"]}"#);

    let uri = "/api/v1/deployments/frontend/replicas";
    let (status, body) = call(&h.api, Method::POST, uri, r#"{"replicas":5}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"updated"}"#);
    assert_eq!(h.backend.mutations(), vec![("frontend".to_string(), 5)]);

    // Accepted by the cluster, not yet observed by the watch.
    let (_, body) = call(&h.api, Method::GET, uri, "").await;
    assert_eq!(body, r#"{"name":"frontend","replicas":3}"#);

    h.events.send(WatchEvent::Updated(deployment("frontend", 5))).await.unwrap();
    settle(&h.store, |s| s.get("frontend") == Some(5)).await;

    let (status, body) = call(&h.api, Method::GET, uri, "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"name":"frontend","replicas":5}"#);
}

#[tokio::test]
async fn invalid_requests_never_reach_cluster() {
    let h = harness();
    h.events.send(WatchEvent::Added(deployment("frontend", 3))).await.unwrap();
    h.events.send(WatchEvent::Synced).await.unwrap();
    h.sync.wait_synced().await;

    let uri = "/api/v1/deployments/frontend/replicas";
    for body in [r#"{"replicas":-1}"#, r#"{"replicas":2,"force":true}"#, "{", ""] {
        let (status, resp) = call(&h.api, Method::POST, uri, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
        assert!(resp.starts_with(r#"{"error":"#), "{resp}");
    }
    assert!(h.backend.mutations().is_empty());
}

#[tokio::test]
async fn unknown_deployment_is_404_for_reads_and_writes() {
    let h = harness();
    h.events.send(WatchEvent::Synced).await.unwrap();
    h.sync.wait_synced().await;

    let uri = "/api/v1/deployments/ghost/replicas";
    let (status, _) = call(&h.api, Method::GET, uri, "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&h.api, Method::POST, uri, r#"{"replicas":1}"#).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deletes_and_tombstones_remove_entries() {
    let h = harness();
    for name in ["a", "b", "c"] {
        h.events.send(WatchEvent::Added(deployment(name, 1))).await.unwrap();
    }
    h.events.send(WatchEvent::Synced).await.unwrap();
    h.sync.wait_synced().await;

    h.events
        .send(WatchEvent::Deleted(DeletedObject::Known(deployment("a", 1))))
        .await
        .unwrap();
    h.events
        .send(WatchEvent::Deleted(DeletedObject::FinalStateUnknown {
            key: "default/b".to_string(),
            last_known: None,
        }))
        .await
        .unwrap();
    settle(&h.store, |s| s.len() == 1).await;

    let (_, body) = call(&h.api, Method::GET, "/api/v1/deployments", "").await;
    assert_eq!(body, r#"{"deployments":["c"]}"#);
}

#[tokio::test]
async fn readiness_follows_sync_and_connectivity() {
    let h = harness();

    let (status, body) = call(&h.probes, Method::GET, "/readyz", "").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "cache not synced");

    let (status, _) = call(&h.probes, Method::GET, "/healthz", "").await;
    assert_eq!(status, StatusCode::OK);

    h.events.send(WatchEvent::Synced).await.unwrap();
    h.sync.wait_synced().await;

    h.backend
        .fail_probe(BackendError::Cluster("kubernetes connectivity check failed: EOF".into()));
    let (status, body) = call(&h.probes, Method::GET, "/readyz", "").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("connectivity check failed"), "{body}");

    h.backend.heal();
    let (status, body) = call(&h.probes, Method::GET, "/readyz", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"ready"}"#);
}

#[tokio::test]
async fn malformed_events_do_not_disturb_cache() {
    let h = harness();
    h.events.send(WatchEvent::Added(deployment("frontend", 3))).await.unwrap();
    h.events.send(WatchEvent::Updated(deployment("frontend", -4))).await.unwrap();
    h.events.send(WatchEvent::Synced).await.unwrap();
    h.sync.wait_synced().await;

    assert_eq!(h.store.get("frontend"), Some(3));
}
