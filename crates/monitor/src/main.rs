//! vigil - continuous cluster application health verification.
//!
//! Two independent subsystems share one notifier and one cancellation
//! signal: the monitoring pipeline (Pod discovery, per-Pod event watching,
//! deduplicated alerting) and the throttled scenario runner (repeated
//! end-to-end verification with alerting on failure).

mod config;
mod monitoring;
mod runner;
mod scenario;
mod server;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use monitoring::detector::PodDetector;
use monitoring::watcher::{EventWatcher, KubeEventSource, KubePodLogs};
use monitoring::DeploymentTarget;
use runner::ScenarioRunner;
use scenario::DeploymentAvailability;
use vigil_notify::{Notifier, SlackNotifier, SlackWebhookClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    info!("starting vigil v{}", env!("CARGO_PKG_VERSION"));

    let client = kube::Client::try_default()
        .await
        .context("while creating Kubernetes client")?;

    let notifier: Arc<dyn Notifier> = Arc::new(
        SlackNotifier::new(
            config.cluster_name.clone(),
            SlackWebhookClient::new(config.slack_webhook_url.clone()),
        )
        .context("while creating Slack notifier")?,
    );

    // One signal cancels everything: the runner, its scenario, and the
    // liveness endpoint.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            cancel.cancel();
        });
    }

    let target = DeploymentTarget {
        namespace: config.observable_namespace.clone(),
        deployments: config.observable_deployments.clone(),
    };

    // Monitoring pipeline.
    let watcher = EventWatcher::new(
        Arc::new(KubeEventSource::new(client.clone())),
        Arc::new(KubePodLogs::new(client.clone())),
        notifier.clone(),
    );
    let detector = PodDetector::new(
        client.clone(),
        Arc::new(watcher.clone()),
        vec![target.clone()],
    );
    detector
        .start()
        .await
        .context("while starting pod monitoring")?;

    // Scenario runner.
    let scenario = Arc::new(DeploymentAvailability::new(
        client,
        target,
        Duration::from_secs(config.scenario_timeout_secs),
    ));
    {
        let runner = ScenarioRunner::new(notifier);
        let cancel = cancel.clone();
        let throttle = Duration::from_secs(config.throttle_secs);
        tokio::spawn(async move { runner.run(cancel, throttle, scenario).await });
    }

    // Blocks until the cancellation token fires.
    server::run_statusz_server(config.port, cancel).await?;

    // Orderly shutdown: release every open event stream.
    watcher.shutdown().await;
    info!("shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("received SIGTERM, shutting down gracefully");
        },
    }
}
