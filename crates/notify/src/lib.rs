//! Slack alerting for the vigil health monitor.
//!
//! Every alert is a single red attachment built from three fixed templates
//! (header/body/footer) with the alert header, failure details, log
//! correlation ID and cluster name substituted in. Delivery goes through a
//! Slack incoming webhook.
//!
//! The notifier never retries: delivery is best-effort and the retry policy,
//! if any, belongs to the caller.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod renderer;
pub mod slack;

pub use error::NotifyError;
pub use renderer::{MessageRenderer, RenderedMessage};
pub use slack::SlackWebhookClient;

use async_trait::async_trait;

/// Color of the attachment bar on every alert. Alerts are always failures.
const ALERT_COLOR: &str = "#d92626";

/// Sink for fully formed alerts.
///
/// `id` correlates the alert with log entries emitted by the caller,
/// `header` names the failing phase and subject, `details` carries the
/// failure description.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, id: &str, header: &str, details: &str) -> Result<(), NotifyError>;
}

/// Renders alerts from the fixed template set and delivers them to Slack.
pub struct SlackNotifier {
    slack: SlackWebhookClient,
    renderer: MessageRenderer,
    cluster_name: String,
}

impl SlackNotifier {
    /// Create a notifier for the given cluster.
    ///
    /// Fails if any of the built-in templates does not parse.
    pub fn new(cluster_name: String, slack: SlackWebhookClient) -> Result<Self, NotifyError> {
        Ok(Self {
            slack,
            renderer: MessageRenderer::new()?,
            cluster_name,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, id: &str, header: &str, details: &str) -> Result<(), NotifyError> {
        let message = self
            .renderer
            .render(id, header, details, &self.cluster_name)?;

        self.slack
            .send(&message.header, &message.body, &message.footer, ALERT_COLOR)
            .await
    }
}
