//! Pod detection: bridges the Pod watch feed to event-watch registration.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ObjectReference, Pod};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, error, info, warn};

use super::{collector, labels, DeploymentTarget, Labels, Observable};

/// Registration surface of the event watcher.
///
/// Both operations are idempotent: registering a watched Pod and
/// unregistering an unknown one are silent no-ops.
#[async_trait]
pub trait EventWatchRegistry: Send + Sync {
    async fn register(&self, target: &ObjectReference) -> Result<()>;
    async fn unregister(&self, target: &ObjectReference) -> Result<()>;
}

/// Dynamically registers and unregisters Pods for event watching.
///
/// Watched Pods are the ones whose labels match the pod template of one of
/// the configured Deployments.
pub struct PodDetector {
    client: Client,
    registry: Arc<dyn EventWatchRegistry>,
    targets: Vec<DeploymentTarget>,
}

impl PodDetector {
    pub fn new(
        client: Client,
        registry: Arc<dyn EventWatchRegistry>,
        targets: Vec<DeploymentTarget>,
    ) -> Self {
        Self {
            client,
            registry,
            targets,
        }
    }

    /// Resolve the membership criterion and subscribe to the Pod feed.
    ///
    /// Any Deployment that cannot be resolved is fatal: the monitor must not
    /// run with a partially known criterion. Once resolution succeeds one
    /// feed task per observed namespace is spawned and this call returns.
    pub async fn start(&self) -> Result<()> {
        let mut observables = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let observable =
                collector::collect_pod_labels_from_deployments(self.client.clone(), target).await?;
            info!(
                namespace = %observable.namespace,
                label_groups = observable.pod_label_groups.len(),
                "resolved observed label sets"
            );
            observables.push(observable);
        }

        let handler = Arc::new(PodFeedHandler::new(self.registry.clone(), observables));

        for namespace in handler.namespaces() {
            let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
            let handler = handler.clone();

            tokio::spawn(async move {
                let stream = watcher(api, watcher::Config::default());
                futures::pin_mut!(stream);

                while let Some(item) = stream.next().await {
                    match item {
                        Ok(watcher::Event::Apply(pod) | watcher::Event::InitApply(pod)) => {
                            handler.pod_applied(&pod).await;
                        }
                        Ok(watcher::Event::Delete(pod)) => handler.pod_deleted(&pod).await,
                        Ok(watcher::Event::Init | watcher::Event::InitDone) => {}
                        Err(err) => {
                            warn!(namespace = %namespace, error = %err, "dropping unusable pod feed item");
                        }
                    }
                }

                warn!(namespace = %namespace, "pod feed ended");
            });
        }

        Ok(())
    }
}

/// Handles one delivery from the Pod feed. Split from [`PodDetector`] so the
/// feed logic is exercisable without a cluster.
struct PodFeedHandler {
    registry: Arc<dyn EventWatchRegistry>,
    observables: HashMap<String, Vec<Labels>>,
}

impl PodFeedHandler {
    fn new(registry: Arc<dyn EventWatchRegistry>, observables: Vec<Observable>) -> Self {
        let mut mapped: HashMap<String, Vec<Labels>> = HashMap::new();
        for observable in observables {
            mapped
                .entry(observable.namespace)
                .or_default()
                .extend(observable.pod_label_groups);
        }

        Self {
            registry,
            observables: mapped,
        }
    }

    fn namespaces(&self) -> Vec<String> {
        self.observables.keys().cloned().collect()
    }

    /// Add and update deliveries are handled identically; idempotent
    /// registration absorbs re-deliveries.
    async fn pod_applied(&self, pod: &Pod) {
        if !self.should_act_on(pod) {
            return;
        }

        let Some(target) = pod_reference(pod) else {
            warn!(pod = %pod.name_any(), "dropping pod with incomplete metadata");
            return;
        };

        info!(pod = %pod.name_any(), "starting to watch pod");
        if let Err(err) = self.registry.register(&target).await {
            error!(pod = %pod.name_any(), "failed to register pod: {err:#}");
        }
    }

    async fn pod_deleted(&self, pod: &Pod) {
        let Some(target) = pod_reference(pod) else {
            warn!(pod = %pod.name_any(), "dropping pod with incomplete metadata");
            return;
        };

        debug!(pod = %pod.name_any(), "stopping watching pod");
        if let Err(err) = self.registry.unregister(&target).await {
            error!(pod = %pod.name_any(), "failed to unregister pod: {err:#}");
        }
    }

    fn should_act_on(&self, pod: &Pod) -> bool {
        let Some(namespace) = pod.namespace() else {
            return false;
        };
        let Some(expected) = self.observables.get(&namespace) else {
            return false;
        };

        labels::matches(expected, pod.labels())
    }
}

/// Stable reference for a Pod. Name, namespace and UID must all be present
/// so the event stream can be pinned to this exact instance.
fn pod_reference(pod: &Pod) -> Option<ObjectReference> {
    let metadata = &pod.metadata;
    Some(ObjectReference {
        api_version: Some("v1".to_string()),
        kind: Some("Pod".to_string()),
        name: Some(metadata.name.clone()?),
        namespace: Some(metadata.namespace.clone()?),
        uid: Some(metadata.uid.clone()?),
        ..ObjectReference::default()
    })
}
