//! Throttled scenario execution.
//!
//! Runs one scenario in an endless loop, one iteration at a time, with a
//! configurable delay between iterations. Failures are alerted through the
//! notifier; successes are only logged. The loop stops promptly when the
//! shared cancellation token fires, including during the inter-iteration
//! wait.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use vigil_notify::Notifier;

/// A repeatable end-to-end verification scenario.
///
/// `execute` is invoked synchronously by the runner and must observe the
/// cancellation token for any internal waiting.
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, cancel: CancellationToken) -> Result<()>;
}

/// Drives a [`Scenario`] in a throttled loop and alerts on failures.
pub struct ScenarioRunner {
    notifier: Arc<dyn Notifier>,
}

impl ScenarioRunner {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Run `scenario` until `cancel` fires.
    ///
    /// Iterations never overlap: the next run starts only after the
    /// previous one and its post-run delay have completed.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        throttle: Duration,
        scenario: Arc<dyn Scenario>,
    ) {
        loop {
            if cancel.is_cancelled() {
                debug!("cancellation requested, shutting down scenario runner");
                return;
            }

            // Correlates this run's log entries with its alert, if any.
            let run_id = Uuid::new_v4().to_string();
            let start_time = Utc::now();

            info!(id = %run_id, scenario = scenario.name(), "starting scenario run");
            let outcome = scenario.execute(cancel.clone()).await;
            let duration = Utc::now() - start_time;

            match outcome {
                Ok(()) => {
                    info!(
                        id = %run_id,
                        scenario = scenario.name(),
                        start = %start_time,
                        duration = %duration,
                        "scenario run succeeded"
                    );
                }
                Err(err) => {
                    error!(
                        id = %run_id,
                        scenario = scenario.name(),
                        start = %start_time,
                        duration = %duration,
                        "scenario run failed: {err:#}"
                    );

                    let header =
                        format!("*[Phase: TESTING]* _Scenario *{}* failed_", scenario.name());
                    if let Err(err) = self
                        .notifier
                        .notify(&run_id, &header, &format!("{err:#}"))
                        .await
                    {
                        error!(id = %run_id, "failed to send notification: {err}");
                    }
                }
            }

            debug!(scenario = scenario.name(), "throttling next run for {throttle:?}");
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("cancellation requested, shutting down scenario runner");
                    return;
                }
                () = tokio::time::sleep(throttle) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_notify::NotifyError;

    #[derive(Default)]
    struct RecordingNotifier {
        calls: std::sync::Mutex<Vec<(String, String, String)>>,
    }

    impl RecordingNotifier {
        fn calls(&self) -> Vec<(String, String, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, id: &str, header: &str, details: &str) -> Result<(), NotifyError> {
            self.calls.lock().unwrap().push((
                id.to_string(),
                header.to_string(),
                details.to_string(),
            ));
            Ok(())
        }
    }

    struct AlwaysFails {
        executions: AtomicUsize,
    }

    #[async_trait]
    impl Scenario for AlwaysFails {
        fn name(&self) -> &str {
            "always-fails"
        }

        async fn execute(&self, _cancel: CancellationToken) -> Result<()> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("provisioning timed out")
        }
    }

    struct AlwaysSucceeds {
        executions: AtomicUsize,
    }

    #[async_trait]
    impl Scenario for AlwaysSucceeds {
        fn name(&self) -> &str {
            "always-succeeds"
        }

        async fn execute(&self, _cancel: CancellationToken) -> Result<()> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn failing_runs_notify_with_distinct_ids() {
        let notifier = Arc::new(RecordingNotifier::default());
        let scenario = Arc::new(AlwaysFails {
            executions: AtomicUsize::new(0),
        });
        let runner = ScenarioRunner::new(notifier.clone());
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            let scenario = scenario.clone();
            tokio::spawn(async move { runner.run(cancel, Duration::ZERO, scenario).await })
        };

        while notifier.calls().len() < 5 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        let calls = notifier.calls();
        assert!(calls.len() >= 5);

        let ids: HashSet<&str> = calls.iter().map(|(id, _, _)| id.as_str()).collect();
        assert_eq!(ids.len(), calls.len(), "run identifiers must be unique");

        for (_, header, details) in &calls {
            assert!(header.contains("always-fails"));
            assert!(details.contains("provisioning timed out"));
        }
    }

    #[tokio::test]
    async fn successful_runs_never_notify() {
        let notifier = Arc::new(RecordingNotifier::default());
        let scenario = Arc::new(AlwaysSucceeds {
            executions: AtomicUsize::new(0),
        });
        let runner = ScenarioRunner::new(notifier.clone());
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            let scenario = scenario.clone();
            tokio::spawn(async move { runner.run(cancel, Duration::ZERO, scenario).await })
        };

        while scenario.executions.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        assert!(notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn cancellation_during_throttle_stops_before_next_run() {
        let notifier = Arc::new(RecordingNotifier::default());
        let scenario = Arc::new(AlwaysFails {
            executions: AtomicUsize::new(0),
        });
        let runner = ScenarioRunner::new(notifier.clone());
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            let scenario = scenario.clone();
            // Throttle far longer than the test: the loop parks in the
            // inter-iteration wait after the first run.
            tokio::spawn(async move {
                runner
                    .run(cancel, Duration::from_secs(3600), scenario)
                    .await;
            })
        };

        while scenario.executions.load(Ordering::SeqCst) < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("runner must stop promptly on cancellation")
            .unwrap();

        assert_eq!(scenario.executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn already_cancelled_runner_never_executes() {
        let notifier = Arc::new(RecordingNotifier::default());
        let scenario = Arc::new(AlwaysFails {
            executions: AtomicUsize::new(0),
        });
        let runner = ScenarioRunner::new(notifier.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        runner
            .run(cancel, Duration::ZERO, scenario.clone())
            .await;

        assert_eq!(scenario.executions.load(Ordering::SeqCst), 0);
        assert!(notifier.calls().is_empty());
    }
}
