//! Startup resolution of the membership criterion.
//!
//! The labels to watch for are not configured directly: they are read from
//! the pod templates of the configured Deployments. Any unresolvable
//! Deployment is fatal, the monitor must not run with a partially known
//! membership criterion.

use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, Client};

use super::{DeploymentTarget, Observable};

/// Resolve the pod-template label sets of every Deployment in `target`.
pub async fn collect_pod_labels_from_deployments(
    client: Client,
    target: &DeploymentTarget,
) -> Result<Observable> {
    let deployments: Api<Deployment> = Api::namespaced(client, &target.namespace);

    let mut pod_label_groups = Vec::with_capacity(target.deployments.len());
    for name in &target.deployments {
        let deployment = deployments
            .get(name)
            .await
            .with_context(|| format!("while getting Deployment {name:?}"))?;

        let labels = deployment
            .spec
            .map(|spec| spec.template)
            .and_then(|template| template.metadata)
            .and_then(|metadata| metadata.labels)
            .unwrap_or_default();

        pod_label_groups.push(labels);
    }

    Ok(Observable {
        namespace: target.namespace.clone(),
        pod_label_groups,
    })
}
