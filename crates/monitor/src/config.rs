//! Service configuration.
//!
//! Every setting is backed by an `APP_*` environment variable, which is how
//! the service is configured in-cluster; the matching flags are a
//! convenience for running it locally against a kubeconfig.

use clap::Parser;

/// Cluster application health monitor.
#[derive(Parser, Debug, Clone)]
#[command(name = "vigil", version)]
pub struct Config {
    /// Port the liveness endpoint listens on.
    #[arg(long, env = "APP_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Delay between consecutive scenario runs, in seconds.
    #[arg(long, env = "APP_THROTTLE_SECS", default_value_t = 60)]
    pub throttle_secs: u64,

    /// Cluster name included in every alert.
    #[arg(long, env = "APP_CLUSTER_NAME")]
    pub cluster_name: String,

    /// Slack incoming-webhook URL alerts are delivered to.
    #[arg(long, env = "APP_SLACK_WEBHOOK_URL")]
    pub slack_webhook_url: String,

    /// Namespace holding the observed Deployments.
    #[arg(long, env = "APP_OBSERVABLE_NAMESPACE")]
    pub observable_namespace: String,

    /// Names of the observed Deployments, comma separated.
    #[arg(
        long,
        env = "APP_OBSERVABLE_DEPLOYMENTS",
        value_delimiter = ',',
        required = true
    )]
    pub observable_deployments: Vec<String>,

    /// Per-run timeout for the built-in scenario, in seconds.
    #[arg(long, env = "APP_SCENARIO_TIMEOUT_SECS", default_value_t = 180)]
    pub scenario_timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_from_flags() {
        let config = Config::try_parse_from([
            "vigil",
            "--cluster-name",
            "prod-eu1",
            "--slack-webhook-url",
            "https://hooks.slack.example/T000/B000",
            "--observable-namespace",
            "catalog",
            "--observable-deployments",
            "catalog-api,catalog-broker",
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.throttle_secs, 60);
        assert_eq!(
            config.observable_deployments,
            vec!["catalog-api", "catalog-broker"]
        );
    }

    #[test]
    fn deployments_are_required() {
        let result = Config::try_parse_from([
            "vigil",
            "--cluster-name",
            "prod-eu1",
            "--slack-webhook-url",
            "https://hooks.slack.example/T000/B000",
            "--observable-namespace",
            "catalog",
        ]);

        assert!(result.is_err());
    }
}
