//! Runtime configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// The default time budget of control plane calls & inventory loads.
const DEFAULT_API_TIMEOUT_SECONDS: u64 = 10;
/// The namespace used when neither the environment nor the kubeconfig provide one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Runtime configuration data.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// The logging config, which uses `tracing_subscriber::EnvFilter` directives.
    pub rust_log: Option<String>,
    /// The Kubernetes namespace of the replica group.
    ///
    /// When unset, the default namespace of the active kubeconfig is used.
    pub namespace: Option<String>,
    /// The name of the pod on which this instance is running.
    pub pod_name: Option<String>,
    /// The hostname of this instance, which Kubernetes sets to the pod name.
    pub hostname: Option<String>,
    /// The time budget in seconds of each control plane call & of the inventory load.
    #[serde(default = "default_api_timeout_seconds")]
    pub api_timeout_seconds: u64,
}

impl Config {
    /// Create a new config instance from the runtime environment.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Result<Self> {
        let config: Config = envy::from_env().context("error building config from env")?;
        Ok(config)
    }

    /// The identity of this running instance, as listed by the control plane.
    pub fn identity(&self) -> Result<&str> {
        self.pod_name
            .as_deref()
            .or_else(|| self.hostname.as_deref())
            .map(str::trim)
            .filter(|val| !val.is_empty())
            .context("could not determine the identity of this instance, set POD_NAME or HOSTNAME")
    }

    /// Resolve the namespace to use, given the kubeconfig's default namespace.
    pub fn namespace_or(&self, fallback: &str) -> String {
        [self.namespace.as_deref(), Some(fallback)]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|val| !val.is_empty())
            .unwrap_or(DEFAULT_NAMESPACE)
            .to_string()
    }

    /// The time budget of each control plane call & of the inventory load.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_seconds)
    }
}

fn default_api_timeout_seconds() -> u64 {
    DEFAULT_API_TIMEOUT_SECONDS
}
