//! Per-Pod event watching with alert deduplication.
//!
//! Each registered Pod owns one event stream and one consumption loop. The
//! loop drops `Normal` events, alerts once per distinct abnormal event, and
//! attaches a bounded capture of the Pod's recent logs to the operator log
//! entry. The handle table is the single source of truth for "is this Pod
//! currently watched".

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Event, ObjectReference, Pod};
use kube::api::{ListParams, LogParams, WatchParams};
use kube::core::WatchEvent;
use kube::{Api, Client};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::monitoring::detector::EventWatchRegistry;
use vigil_notify::Notifier;

/// Event type emitted for healthy lifecycle transitions; never alerted on.
const EVENT_TYPE_NORMAL: &str = "Normal";

/// How many trailing log lines to capture per alert.
const TAIL_LINES: i64 = 2000;

/// Upper bound on captured log bytes, pathological log volumes stay bounded.
const LOGS_LIMIT_BYTES: i64 = 1_048_576;

/// Source of per-Pod event streams.
///
/// The returned stream carries only event objects; stream plumbing errors
/// are the implementation's concern. Open failures are synchronous so a
/// caller can skip just the failing Pod.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn open(&self, target: &ObjectReference) -> Result<BoxStream<'static, Event>>;
}

/// Source of recent Pod log output, bounded by the implementation.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn recent_logs(&self, target: &ObjectReference) -> Result<String>;
}

/// State for one watched Pod: the stop capability of its event stream and
/// the identifiers already alerted on. The dedup set only ever grows while
/// the handle lives; dropping the handle releases it.
struct WatchHandle {
    stop: CancellationToken,
    notified: HashSet<String>,
}

/// Watches events for registered Pods and alerts on abnormal ones.
#[derive(Clone)]
pub struct EventWatcher {
    events: Arc<dyn EventSource>,
    logs: Arc<dyn LogSource>,
    notifier: Arc<dyn Notifier>,
    watched: Arc<Mutex<HashMap<String, WatchHandle>>>,
}

impl EventWatcher {
    pub fn new(
        events: Arc<dyn EventSource>,
        logs: Arc<dyn LogSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            events,
            logs,
            notifier,
            watched: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start watching events for `target`.
    ///
    /// Registering an already-watched Pod is a no-op. On success the
    /// consumption loop runs until the stream closes or the Pod is
    /// unregistered.
    pub async fn register(&self, target: &ObjectReference) -> Result<()> {
        let key = ref_key(target);

        let mut watched = self.watched.lock().await;
        if watched.contains_key(&key) {
            return Ok(());
        }

        let stream = self
            .events
            .open(target)
            .await
            .with_context(|| format!("while opening event stream for pod {key:?}"))?;

        let stop = CancellationToken::new();
        watched.insert(
            key.clone(),
            WatchHandle {
                stop: stop.clone(),
                notified: HashSet::new(),
            },
        );

        let watcher = self.clone();
        let target = target.clone();
        tokio::spawn(async move {
            watcher.consume(&key, &target, stream, stop).await;
        });

        Ok(())
    }

    /// Stop watching events for `target` and drop its handle.
    ///
    /// Unregistering an unknown Pod is a no-op.
    pub async fn unregister(&self, target: &ObjectReference) -> Result<()> {
        let key = ref_key(target);

        let mut watched = self.watched.lock().await;
        if let Some(handle) = watched.remove(&key) {
            handle.stop.cancel();
            debug!(pod = %key, "stopped watching pod events");
        }

        Ok(())
    }

    /// Release every outstanding handle. Called on orderly shutdown.
    pub async fn shutdown(&self) {
        let mut watched = self.watched.lock().await;
        let count = watched.len();
        for (_, handle) in watched.drain() {
            handle.stop.cancel();
        }
        if count > 0 {
            info!(count, "released all event watches");
        }
    }

    async fn consume(
        &self,
        key: &str,
        target: &ObjectReference,
        mut stream: BoxStream<'static, Event>,
        stop: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                () = stop.cancelled() => break,
                item = stream.next() => match item {
                    Some(event) => event,
                    None => break,
                },
            };

            self.process_event(key, target, &event).await;
        }

        debug!(pod = %key, "event consumption loop finished");
    }

    /// Handle one delivered event: filter, dedup, capture logs, alert.
    async fn process_event(&self, key: &str, target: &ObjectReference, event: &Event) {
        // Healthy pods emit Normal events too (scheduling, image pulls).
        if event.type_.as_deref() == Some(EVENT_TYPE_NORMAL) {
            return;
        }

        let id = event_key(event);

        {
            let watched = self.watched.lock().await;
            let Some(handle) = watched.get(key) else {
                // Unregistered while this loop was draining its stream.
                return;
            };
            if handle.notified.contains(&id) {
                return;
            }
        }

        let details = format!(
            "Event type: {}, reason: {}, message: {}",
            event.type_.as_deref().unwrap_or_default(),
            event.reason.as_deref().unwrap_or_default(),
            event.message.as_deref().unwrap_or_default(),
        );

        // Best-effort: an alert without logs beats no alert.
        let dumped_logs = match self.logs.recent_logs(target).await {
            Ok(logs) => logs,
            Err(err) => {
                error!(id = %id, "failed to capture logs from pod: {err:#}");
                String::new()
            }
        };

        let pod_name = target.name.as_deref().unwrap_or_default();
        let header = format!("*[Phase: MONITORING]* _Pod {pod_name} is reporting problems_");

        if let Err(err) = self.notifier.notify(&id, &header, &details).await {
            // Not marked as notified: an upstream redelivery of the same
            // identifier gets another chance.
            error!(id = %id, "failed to send notification: {err}");
            return;
        }

        {
            let mut watched = self.watched.lock().await;
            if let Some(handle) = watched.get_mut(key) {
                handle.notified.insert(id.clone());
            }
        }

        info!(id = %id, "{details}");
        info!(id = %id, "logs from pod {key}: {dumped_logs}");
    }
}

#[async_trait]
impl EventWatchRegistry for EventWatcher {
    async fn register(&self, target: &ObjectReference) -> Result<()> {
        Self::register(self, target).await
    }

    async fn unregister(&self, target: &ObjectReference) -> Result<()> {
        Self::unregister(self, target).await
    }
}

/// Handle-table key. Namespace-qualified so name reuse across namespaces
/// cannot collide; the stream itself additionally pins kind and UID.
fn ref_key(target: &ObjectReference) -> String {
    format!(
        "{}/{}",
        target.namespace.as_deref().unwrap_or_default(),
        target.name.as_deref().unwrap_or_default()
    )
}

/// Identifier of a distinct event instance.
fn event_key(event: &Event) -> String {
    format!(
        "{}/{}",
        event.metadata.namespace.as_deref().unwrap_or_default(),
        event.metadata.name.as_deref().unwrap_or_default()
    )
}

/// Event streams backed by the Kubernetes API.
///
/// The watch is pinned to the referenced object's name, namespace, kind and
/// UID, so events for a later Pod reusing the same name never cross over.
pub struct KubeEventSource {
    client: Client,
}

impl KubeEventSource {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventSource for KubeEventSource {
    async fn open(&self, target: &ObjectReference) -> Result<BoxStream<'static, Event>> {
        let namespace = target.namespace.clone().unwrap_or_default();
        let events: Api<Event> = Api::namespaced(self.client.clone(), &namespace);

        let selector = format!(
            "involvedObject.name={},involvedObject.namespace={},involvedObject.kind={},involvedObject.uid={}",
            target.name.as_deref().unwrap_or_default(),
            namespace,
            target.kind.as_deref().unwrap_or_default(),
            target.uid.as_deref().unwrap_or_default(),
        );
        let params = WatchParams::default().fields(&selector);

        // The pump task below can only log; an unreachable event API has to
        // fail registration here, synchronously.
        events
            .list(&ListParams::default().fields(&selector).limit(1))
            .await
            .context("while probing the event API")?;

        let (tx, rx) = futures::channel::mpsc::unbounded();
        tokio::spawn(async move {
            let stream = match events.watch(&params, "0").await {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("failed to start event watch: {err}");
                    return;
                }
            };
            futures::pin_mut!(stream);

            while let Some(item) = stream.next().await {
                let event = match item {
                    Ok(WatchEvent::Added(event) | WatchEvent::Modified(event)) => event,
                    Ok(WatchEvent::Error(status)) => {
                        warn!(
                            code = status.code,
                            "event watch returned an error status: {}", status.message
                        );
                        continue;
                    }
                    Ok(_) => continue,
                    Err(err) => {
                        warn!("event watch item failed: {err}");
                        continue;
                    }
                };

                // The consumer unregistered; stop pumping.
                if tx.unbounded_send(event).is_err() {
                    return;
                }
            }
        });

        Ok(rx.boxed())
    }
}

/// Bounded Pod log capture backed by the Kubernetes API.
pub struct KubePodLogs {
    client: Client,
}

impl KubePodLogs {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogSource for KubePodLogs {
    async fn recent_logs(&self, target: &ObjectReference) -> Result<String> {
        let namespace = target.namespace.clone().unwrap_or_default();
        let name = target.name.clone().unwrap_or_default();
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);

        let params = LogParams {
            tail_lines: Some(TAIL_LINES),
            limit_bytes: Some(LOGS_LIMIT_BYTES),
            ..LogParams::default()
        };

        pods.logs(&name, &params)
            .await
            .with_context(|| format!("while reading logs from pod {name:?}"))
    }
}
