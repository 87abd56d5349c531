//! Serve mode: wires the cache, the cluster adapter and both listeners,
//! and runs them until a shutdown signal.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use replicant_api::{ReplicaBackend, build_probe_router, build_router};
use replicant_cache::{Reconciler, ReplicaStore, SyncFlag};
use replicant_health::ReadinessGate;
use replicant_kube::{DeploymentApi, KubeBackend, MutationGateway, run_deployment_watch};
use replicant_tls::{ServeOptions, load_server_config, serve_plain, serve_tls};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::Config;

/// Capacity of the watch-to-reconciler channel.
const EVENT_BUFFER: usize = 1024;

pub async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    let tls = config
        .tls_paths()?
        .map(|paths| load_server_config(&paths))
        .transpose()
        .context("failed to load mTLS material")?;

    let cluster = DeploymentApi::connect(&config.namespace)
        .await
        .context("failed to connect to the kubernetes API")?;

    // ── Cache ──────────────────────────────────────────────────

    let store = ReplicaStore::new();
    let sync = SyncFlag::new();
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let (cache_stop_tx, cache_stop_rx) = watch::channel(false);

    let reconciler = Reconciler::new(store.clone(), sync.clone());
    let reconciler_handle = tokio::spawn(reconciler.run(events_rx, cache_stop_rx.clone()));
    let watch_handle = tokio::spawn(run_deployment_watch(
        cluster.api().clone(),
        cluster.namespace().to_string(),
        events_tx,
        cache_stop_rx,
    ));

    // ── Routers ────────────────────────────────────────────────

    let gateway = MutationGateway::new(cluster.api().clone(), config.request_timeout());
    let backend: Arc<dyn ReplicaBackend> =
        Arc::new(KubeBackend::new(store, sync, gateway, cluster.api().clone()));
    let gate = Arc::new(ReadinessGate::new(config.readiness_timeout()));

    let api_router = build_router(backend.clone(), config.request_timeout());
    let probe_router = build_probe_router(backend, gate, config.request_timeout());

    // ── Listeners ──────────────────────────────────────────────

    let probe_listener = TcpListener::bind(config.probe_listen_addr)
        .await
        .with_context(|| format!("failed to bind probe listener on {}", config.probe_listen_addr))?;
    let api_listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", config.listen_addr))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let options = ServeOptions {
        shutdown_grace: config.shutdown_grace(),
        ..ServeOptions::default()
    };
    let mut servers = JoinSet::new();

    info!(addr = %config.probe_listen_addr, "probe server starting");
    let probe_shutdown = shutdown_rx.clone();
    servers.spawn(async move {
        serve_plain(probe_listener, probe_router, probe_shutdown, options).await;
        "probe"
    });

    match tls {
        Some(tls) => {
            info!(addr = %config.listen_addr, "API server starting with mTLS");
            servers.spawn(async move {
                serve_tls(api_listener, tls, api_router, shutdown_rx, options).await;
                "api"
            });
        }
        None => {
            warn!(addr = %config.listen_addr, "API server starting without TLS");
            servers.spawn(async move {
                serve_plain(api_listener, api_router, shutdown_rx, options).await;
                "api"
            });
        }
    }

    // ── Shutdown ───────────────────────────────────────────────

    let exited_early = wait_for_stop(&mut servers, shutdown_signal()).await;
    let _ = shutdown_tx.send(true);
    while let Some(res) = servers.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "server task failed");
        }
    }

    let _ = cache_stop_tx.send(true);
    if let Err(e) = watch_handle.await {
        warn!(error = %e, "watch task failed");
    }
    if let Err(e) = reconciler_handle.await {
        warn!(error = %e, "reconciler task failed");
    }

    if let Some(name) = exited_early {
        return Err(anyhow!("{name} server exited before shutdown was requested"));
    }
    info!("replicantd stopped");
    Ok(())
}

/// Wait for `signal` or for any server to finish on its own.
///
/// Returns the name of a server that exited first, or `None` when the
/// signal arrived while every server was still running.
async fn wait_for_stop(
    servers: &mut JoinSet<&'static str>,
    signal: impl Future<Output = ()>,
) -> Option<&'static str> {
    tokio::select! {
        _ = signal => None,
        Some(res) = servers.join_next() => {
            let name = res.unwrap_or_else(|e| {
                error!(error = %e, "server task failed");
                "unknown"
            });
            error!(server = name, "server stopped unexpectedly, shutting down");
            Some(name)
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
