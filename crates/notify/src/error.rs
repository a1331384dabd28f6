//! Error types for the alerting pipeline.

use thiserror::Error;

/// Errors that can occur while rendering or delivering an alert.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// A built-in template failed to parse
    #[error("Template failed to parse: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),

    /// Template rendering failed
    #[error("Message rendering failed: {0}")]
    Render(#[from] handlebars::RenderError),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The webhook answered with a non-success status
    #[error("Slack webhook returned status {0}")]
    UnexpectedStatus(reqwest::StatusCode),
}
