//! Deployment watch.
//!
//! Drives the kube watcher for the managed namespace and forwards its
//! events to the reconciler channel. The watcher relists after a
//! disconnect; a name that was known before the relist but is absent from
//! it was deleted while nobody was watching, and is reported as a
//! [`DeletedObject::FinalStateUnknown`] tombstone.

use std::collections::HashSet;

use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::Api;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Event};
use replicant_cache::event::deployment_name;
use replicant_cache::{DeletedObject, WatchEvent};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Maps raw watcher events to [`WatchEvent`]s.
///
/// Tracks which names the consumer has been told about, so that a relist
/// can distinguish adds from updates and detect missed deletes.
#[derive(Debug)]
pub struct WatchTranslator {
    namespace: String,
    known: HashSet<String>,
    relist: Option<HashSet<String>>,
}

impl WatchTranslator {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            known: HashSet::new(),
            relist: None,
        }
    }

    /// Translate one watcher event. May yield zero or more events.
    pub fn translate(&mut self, event: Event<Deployment>) -> Vec<WatchEvent> {
        match event {
            Event::Init => {
                self.relist = Some(HashSet::new());
                Vec::new()
            }
            Event::InitApply(d) => {
                if let (Some(seen), Some(name)) = (self.relist.as_mut(), deployment_name(&d)) {
                    seen.insert(name);
                }
                vec![self.observe(d)]
            }
            Event::InitDone => {
                let mut out = Vec::new();
                if let Some(seen) = self.relist.take() {
                    let mut missed: Vec<String> = self.known.difference(&seen).cloned().collect();
                    missed.sort();
                    for name in missed {
                        self.known.remove(&name);
                        out.push(WatchEvent::Deleted(DeletedObject::FinalStateUnknown {
                            key: format!("{}/{}", self.namespace, name),
                            last_known: None,
                        }));
                    }
                }
                out.push(WatchEvent::Synced);
                out
            }
            Event::Apply(d) => vec![self.observe(d)],
            Event::Delete(d) => {
                if let Some(name) = deployment_name(&d) {
                    self.known.remove(&name);
                }
                vec![WatchEvent::Deleted(DeletedObject::Known(d))]
            }
        }
    }

    fn observe(&mut self, d: Deployment) -> WatchEvent {
        match deployment_name(&d) {
            Some(name) if !self.known.insert(name.clone()) => WatchEvent::Updated(d),
            _ => WatchEvent::Added(d),
        }
    }
}

/// Watch Deployments in `namespace` until `shutdown` fires or the
/// receiving side of `events` is dropped.
///
/// Watch errors are logged and retried with the watcher's default backoff.
pub async fn run_deployment_watch(
    api: Api<Deployment>,
    namespace: String,
    events: mpsc::Sender<WatchEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut translator = WatchTranslator::new(namespace.clone());
    let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
    tokio::pin!(stream);

    info!(%namespace, "deployment watch started");
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = stream.next() => next,
        };

        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                warn!(%namespace, error = %e, "deployment watch error");
                continue;
            }
            None => {
                warn!(%namespace, "deployment watch stream ended");
                break;
            }
        };

        for out in translator.translate(event) {
            if events.send(out).await.is_err() {
                debug!("reconciler channel closed, stopping watch");
                return;
            }
        }
    }
    info!(%namespace, "deployment watch stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use replicant_cache::{CacheOp, Reconciler, ReplicaStore, SyncFlag};

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

    fn ops(events: Vec<WatchEvent>) -> Vec<CacheOp> {
        events.into_iter().filter_map(|e| e.into_op().ok()).collect()
    }

    fn upsert(name: &str, replicas: i32) -> CacheOp {
        CacheOp::Upsert {
            name: name.to_string(),
            replicas,
        }
    }

    #[test]
    fn initial_list_then_synced() {
        let mut t = WatchTranslator::new("default");
        assert!(t.translate(Event::Init).is_empty());

        let first = t.translate(Event::InitApply(deployment("api", 2)));
        assert!(matches!(first.as_slice(), [WatchEvent::Added(_)]));

        let done = t.translate(Event::InitDone);
        assert!(matches!(done.as_slice(), [WatchEvent::Synced]));
    }

    #[test]
    fn live_events_distinguish_add_and_update() {
        let mut t = WatchTranslator::new("default");
        assert!(matches!(
            t.translate(Event::Apply(deployment("web", 1))).as_slice(),
            [WatchEvent::Added(_)]
        ));
        assert!(matches!(
            t.translate(Event::Apply(deployment("web", 4))).as_slice(),
            [WatchEvent::Updated(_)]
        ));
        assert_eq!(
            ops(t.translate(Event::Delete(deployment("web", 4)))),
            vec![CacheOp::Delete { name: "web".into() }]
        );
    }

    #[test]
    fn relist_reports_missed_deletes_as_tombstones() {
        let mut t = WatchTranslator::new("shop");
        t.translate(Event::Init);
        t.translate(Event::InitApply(deployment("api", 1)));
        t.translate(Event::InitApply(deployment("cart", 1)));
        t.translate(Event::InitDone);

        // Reconnect: "cart" was deleted while disconnected.
        t.translate(Event::Init);
        let relisted = t.translate(Event::InitApply(deployment("api", 3)));
        assert!(matches!(relisted.as_slice(), [WatchEvent::Updated(_)]));

        let done = t.translate(Event::InitDone);
        match done.as_slice() {
            [
                WatchEvent::Deleted(DeletedObject::FinalStateUnknown { key, last_known }),
                WatchEvent::Synced,
            ] => {
                assert_eq!(key, "shop/cart");
                assert!(last_known.is_none());
            }
            other => panic!("unexpected events: {other:?}"),
        }

        // A later relist without changes reports nothing missing.
        t.translate(Event::Init);
        t.translate(Event::InitApply(deployment("api", 3)));
        assert!(matches!(t.translate(Event::InitDone).as_slice(), [WatchEvent::Synced]));
    }

    #[test]
    fn translated_stream_drives_reconciler() {
        let reconciler = Reconciler::new(ReplicaStore::new(), SyncFlag::new());
        let mut t = WatchTranslator::new("default");

        let script = vec![
            Event::Init,
            Event::InitApply(deployment("frontend", 3)),
            Event::InitApply(deployment("worker", 1)),
            Event::InitDone,
            Event::Apply(deployment("frontend", 5)),
            Event::Init,
            Event::InitApply(deployment("frontend", 5)),
            Event::InitDone,
        ];
        for raw in script {
            for ev in t.translate(raw) {
                reconciler.apply(ev);
            }
        }

        assert_eq!(reconciler.store().list(), vec!["frontend".to_string()]);
        assert_eq!(reconciler.store().get("frontend"), Some(5));
        assert!(reconciler.sync_flag().has_synced());
    }

    #[test]
    fn relist_upserts_match_live_upserts() {
        let mut t = WatchTranslator::new("default");
        t.translate(Event::Init);
        assert_eq!(
            ops(t.translate(Event::InitApply(deployment("api", 2)))),
            vec![upsert("api", 2)]
        );
        assert_eq!(
            ops(t.translate(Event::Apply(deployment("api", 7)))),
            vec![upsert("api", 7)]
        );
    }
}
