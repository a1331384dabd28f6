//! Slack incoming-webhook delivery.

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use crate::error::NotifyError;

/// Minimal client for a Slack incoming webhook.
pub struct SlackWebhookClient {
    webhook_url: String,
    client: reqwest::Client,
}

/// Webhook payload with a single attachment.
#[derive(Serialize)]
struct SlackPayload {
    attachments: Vec<SlackAttachment>,
}

#[derive(Serialize)]
struct SlackAttachment {
    fallback: String,
    color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pretext: Option<String>,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<i64>,
}

impl SlackWebhookClient {
    #[must_use]
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Deliver one message as a colored attachment.
    pub async fn send(
        &self,
        header: &str,
        body: &str,
        footer: &str,
        color: &str,
    ) -> Result<(), NotifyError> {
        let payload = SlackPayload {
            attachments: vec![SlackAttachment {
                fallback: header.to_string(),
                color: color.to_string(),
                pretext: Some(header.to_string()),
                text: body.to_string(),
                footer: Some(footer.to_string()),
                ts: Some(Utc::now().timestamp()),
            }],
        };

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::UnexpectedStatus(status));
        }

        debug!("Slack message delivered");
        Ok(())
    }
}
