//! Built-in verification scenario.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::monitoring::DeploymentTarget;
use crate::runner::Scenario;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Verifies that every observed Deployment reaches full availability within
/// a bounded wait. A stand-in end-to-end check: any [`Scenario`] with richer
/// steps can be wired into the runner in its place.
pub struct DeploymentAvailability {
    client: Client,
    target: DeploymentTarget,
    timeout: Duration,
}

impl DeploymentAvailability {
    pub fn new(client: Client, target: DeploymentTarget, timeout: Duration) -> Self {
        Self {
            client,
            target,
            timeout,
        }
    }
}

#[async_trait]
impl Scenario for DeploymentAvailability {
    fn name(&self) -> &str {
        "deployment-availability"
    }

    async fn execute(&self, cancel: CancellationToken) -> Result<()> {
        let deployments: Api<Deployment> =
            Api::namespaced(self.client.clone(), &self.target.namespace);
        let deadline = tokio::time::Instant::now() + self.timeout;

        for name in &self.target.deployments {
            loop {
                if cancel.is_cancelled() {
                    bail!("cancelled while waiting for deployment {name:?}");
                }

                let deployment = deployments
                    .get(name)
                    .await
                    .with_context(|| format!("while getting Deployment {name:?}"))?;

                let desired = deployment
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.replicas)
                    .unwrap_or(1);
                let available = deployment
                    .status
                    .as_ref()
                    .and_then(|status| status.available_replicas)
                    .unwrap_or(0);

                if available >= desired {
                    debug!(deployment = %name, available, desired, "deployment is available");
                    break;
                }

                if tokio::time::Instant::now() >= deadline {
                    bail!(
                        "deployment {name:?} did not become available in time \
                         ({available}/{desired} replicas)"
                    );
                }

                tokio::select! {
                    () = cancel.cancelled() => {
                        bail!("cancelled while waiting for deployment {name:?}");
                    }
                    () = tokio::time::sleep(POLL_INTERVAL) => {}
                }
            }
        }

        Ok(())
    }
}
