//! Three-part alert message rendering.
//!
//! The template set is fixed at compile time; only the substituted values
//! vary per alert. Templates are parsed once at notifier construction so a
//! broken template surfaces at startup, not on the first failure.

use handlebars::Handlebars;
use serde_json::json;

use crate::error::NotifyError;

const HEADER_TEMPLATE: &str = "{{header}} :rotating_light:";
const BODY_TEMPLATE: &str = "*Details:*
{{details}}

Additional information was logged with ID: {{id}}.";
const FOOTER_TEMPLATE: &str =
    "Check cluster _{{cluster}}_ *ASAP* to gather information about the failure.";

/// A fully rendered alert, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub header: String,
    pub body: String,
    pub footer: String,
}

/// Renders the header/body/footer of an alert from the built-in templates.
pub struct MessageRenderer {
    registry: Handlebars<'static>,
}

impl MessageRenderer {
    /// Parse and register the built-in templates.
    pub fn new() -> Result<Self, NotifyError> {
        let mut registry = Handlebars::new();
        // Messages are Slack markdown, not HTML.
        registry.register_escape_fn(handlebars::no_escape);

        registry
            .register_template_string("header", HEADER_TEMPLATE)
            .map_err(Box::new)?;
        registry
            .register_template_string("body", BODY_TEMPLATE)
            .map_err(Box::new)?;
        registry
            .register_template_string("footer", FOOTER_TEMPLATE)
            .map_err(Box::new)?;

        Ok(Self { registry })
    }

    /// Render the three message parts for one alert.
    pub fn render(
        &self,
        id: &str,
        header: &str,
        details: &str,
        cluster_name: &str,
    ) -> Result<RenderedMessage, NotifyError> {
        let data = json!({
            "id": id,
            "header": header,
            "details": details,
            "cluster": cluster_name,
        });

        Ok(RenderedMessage {
            header: self.registry.render("header", &data)?,
            body: self.registry.render("body", &data)?,
            footer: self.registry.render("footer", &data)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_three_parts() {
        let renderer = MessageRenderer::new().unwrap();

        let message = renderer
            .render(
                "run-42",
                "*[Phase: TESTING]* _Scenario failed_",
                "timed out waiting for deployment",
                "prod-eu1",
            )
            .unwrap();

        assert_eq!(
            message.header,
            "*[Phase: TESTING]* _Scenario failed_ :rotating_light:"
        );
        assert!(message.body.contains("timed out waiting for deployment"));
        assert!(message.body.contains("logged with ID: run-42"));
        assert!(message.footer.contains("_prod-eu1_"));
    }

    #[test]
    fn does_not_escape_markdown() {
        let renderer = MessageRenderer::new().unwrap();

        let message = renderer
            .render("id", "<urgent> & *bold*", "a < b", "cluster")
            .unwrap();

        assert!(message.header.starts_with("<urgent> & *bold*"));
        assert!(message.body.contains("a < b"));
    }
}
